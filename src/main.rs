use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use product_scraper::config::Config;
use product_scraper::logger;
use product_scraper::{App, CancelFlag};

#[derive(Parser, Debug)]
#[command(name = "product_scraper", version, about = "批量提取商品详情")]
struct Cli {
    /// TOML 配置文件（不提供时使用默认值 + 环境变量）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 从文件读取标识符并运行一个提取任务
    Run {
        /// 标识符文件（CSV 或每行一个）
        #[arg(long)]
        input: PathBuf,

        /// 指定任务ID，默认使用当前时间戳
        #[arg(long)]
        job_id: Option<String>,
    },
    /// 查询任务状态
    Status {
        #[arg(long)]
        job_id: String,
    },
    /// 提取单个商品并输出 JSON
    Extract { identifier: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = match &cli.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::from_env()?,
    };

    // 初始化日志
    logger::init_verbose(config.verbose_logging);

    // 初始化应用
    let app = App::initialize(config).await?;

    let outcome = run_command(&app, cli.command).await;
    app.shutdown().await;
    outcome
}

async fn run_command(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Run { input, job_id } => {
            let cancel = CancelFlag::new();
            let signal_flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("⚠️ 收到中断信号，当前批次完成后停止");
                    signal_flag.cancel();
                }
            });

            let report = app.run_file(&input, job_id, &cancel).await?;
            info!(
                "报告已保存到 {}，任务ID: {}",
                app.config().results_dir,
                report.job_id
            );
        }
        Command::Status { job_id } => {
            let status = app.job_status(&job_id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Extract { identifier } => match app.extract_one(&identifier).await {
            Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
            None => anyhow::bail!("提取失败: {}", identifier),
        },
    }
    Ok(())
}

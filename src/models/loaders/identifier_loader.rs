use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::fs;

/// 优先识别的列名
const IDENTIFIER_COLUMNS: [&str; 5] = ["url", "enlace", "link", "sku", "part_number"];

/// 从文件加载商品标识符列表（保持文件中的顺序）
///
/// 支持：
/// - 带表头的 CSV：优先取 `url` / `enlace` / `link` / `sku` 列
/// - 无可识别表头的 CSV：每行取第一个 `http(s)://` 开头的值
/// - 纯文本：每个非空行一个标识符
pub async fn load_identifiers(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取标识符文件: {}", path.display()))?;

    let identifiers = parse_identifiers(&content)?;
    tracing::info!(
        "从 {} 读取到 {} 个标识符",
        path.file_name().unwrap_or_default().to_string_lossy(),
        identifiers.len()
    );
    Ok(identifiers)
}

/// 解析标识符文本
pub fn parse_identifiers(content: &str) -> Result<Vec<String>> {
    let url_pattern = Regex::new(r"^https?://\S+$").context("URL 正则编译失败")?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.trim_start_matches('\u{feff}').as_bytes());

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("第 {} 行 CSV 格式错误", index + 1))?;
        let cells: Vec<String> = record.iter().map(str::to_string).collect();
        if cells.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        rows.push(cells);
    }

    let header_column = rows.first().and_then(|first| {
        first.iter().position(|cell| {
            IDENTIFIER_COLUMNS
                .iter()
                .any(|name| cell.eq_ignore_ascii_case(name))
        })
    });

    let mut identifiers = Vec::new();
    for cells in rows.into_iter().skip(usize::from(header_column.is_some())) {
        let picked = match header_column {
            Some(index) => cells.get(index).filter(|c| !c.is_empty()).cloned(),
            None if cells.len() == 1 => cells.into_iter().next(),
            None => cells.into_iter().find(|cell| url_pattern.is_match(cell)),
        };
        if let Some(identifier) = picked {
            identifiers.push(identifier);
        }
    }

    Ok(identifiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_column_is_preferred() {
        let csv = "name,URL\nMonitor,https://shop.test/p/1\nTeclado,https://shop.test/p/2\n";
        let ids = parse_identifiers(csv).unwrap();
        assert_eq!(ids, vec!["https://shop.test/p/1", "https://shop.test/p/2"]);
    }

    #[test]
    fn first_url_cell_is_used_without_header() {
        let csv = "Monitor,\"https://shop.test/p/1\",10\nsin url,nada\n";
        let ids = parse_identifiers(csv).unwrap();
        assert_eq!(ids, vec!["https://shop.test/p/1"]);
    }

    #[test]
    fn quoted_cells_with_commas_keep_their_column() {
        let csv = "name,url\n\"Monitor 24\"\", negro\",https://shop.test/p/1\n\"Teclado, USB\",https://shop.test/p/2\n";
        let ids = parse_identifiers(csv).unwrap();
        assert_eq!(ids, vec!["https://shop.test/p/1", "https://shop.test/p/2"]);
    }

    #[test]
    fn quoted_commas_without_header_still_find_the_url() {
        let csv = "\"Mouse, inalámbrico\",https://shop.test/p/3,5\n";
        let ids = parse_identifiers(csv).unwrap();
        assert_eq!(ids, vec!["https://shop.test/p/3"]);
    }

    #[test]
    fn plain_lines_are_identifiers() {
        let text = "SKU-1\n\n  SKU-2  \nSKU-1\n";
        let ids = parse_identifiers(text).unwrap();
        assert_eq!(ids, vec!["SKU-1", "SKU-2", "SKU-1"]);
    }

    #[tokio::test]
    async fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skus.csv");
        std::fs::write(&path, "sku\nA1\nB2\n").unwrap();

        let ids = load_identifiers(&path).await.unwrap();
        assert_eq!(ids, vec!["A1", "B2"]);
    }
}

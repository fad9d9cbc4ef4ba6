//! 实例自己打开的会话登记表
//!
//! 多个实例可能连接到同一个浏览器（调试端口模式），`browser.pages()` 会返回
//! 所有人的标签页。强制复用时只能关闭登记在本实例名下的会话。

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

pub struct SessionRegistry<K, S> {
    sessions: Mutex<HashMap<K, S>>,
}

impl<K: Eq + Hash, S> SessionRegistry<K, S> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, key: K, session: S) {
        self.lock().insert(key, session);
    }

    /// 会话正常结束后注销
    pub fn remove(&self, key: &K) -> Option<S> {
        self.lock().remove(key)
    }

    /// 取出全部会话（强制复用时关闭它们）
    pub fn drain(&self) -> Vec<S> {
        self.lock().drain().map(|(_, session)| session).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, S>> {
        // 登记表里只有句柄，锁中毒后数据仍然可用
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K: Eq + Hash, S> Default for SessionRegistry<K, S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draining_one_instance_leaves_the_others_alone() {
        // 两个实例连接同一个浏览器，各自只登记自己打开的标签页
        let first: SessionRegistry<String, &str> = SessionRegistry::new();
        let second: SessionRegistry<String, &str> = SessionRegistry::new();
        first.register("T1".to_string(), "page-1");
        second.register("T2".to_string(), "page-2");

        assert_eq!(first.drain(), vec!["page-1"]);
        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn finished_sessions_are_not_closed_again() {
        let registry: SessionRegistry<String, u32> = SessionRegistry::new();
        registry.register("A".to_string(), 1);
        registry.register("B".to_string(), 2);

        assert_eq!(registry.remove(&"A".to_string()), Some(1));
        assert_eq!(registry.remove(&"A".to_string()), None);
        assert_eq!(registry.drain(), vec![2]);
    }
}

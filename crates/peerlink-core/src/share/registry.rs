//! 分享代码注册表
//!
//! 维护 代码 → (文件路径, 显示名称) 的映射，并记录哪些代码正在被监听。
//! 这是整个子系统唯一的共享可变状态，所有操作都在同一把锁内完成，
//! 因此并发的 `offer` 永远不会拿到相同的代码。

use crate::error::ShareError;
use log::debug;
use rand::Rng;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// 分享代码的取值范围（含两端）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRange {
    pub min: u16,
    pub max: u16,
}

impl CodeRange {
    /// IANA 动态端口范围，与常见系统端口不重叠
    pub const DYNAMIC: CodeRange = CodeRange {
        min: 49152,
        max: 65535,
    };

    /// 两端顺序不限；代码 0 会让系统随机分配端口，因此下限为 1
    pub fn new(a: u16, b: u16) -> Self {
        Self {
            min: a.min(b).max(1),
            max: a.max(b).max(1),
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn contains(&self, code: u16) -> bool {
        (self.min..=self.max).contains(&code)
    }
}

impl Default for CodeRange {
    fn default() -> Self {
        Self::DYNAMIC
    }
}

/// 一个已登记的分享
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub code: u16,
    pub stored_path: PathBuf,
    pub display_name: String,
}

/// 分享状态，已退役的分享直接从注册表移除
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferState {
    Registered,
    Serving,
}

struct Entry {
    offer: Arc<Offer>,
    state: OfferState,
    stop: Option<CancellationToken>,
}

/// 分享代码注册表
pub struct PortRegistry {
    range: CodeRange,
    entries: Mutex<HashMap<u16, Entry>>,
}

impl PortRegistry {
    pub fn new(range: CodeRange) -> Self {
        Self {
            range,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn range(&self) -> CodeRange {
        self.range
    }

    /// 登记文件并分配一个当前未被使用的代码
    pub async fn offer(
        &self,
        stored_path: impl Into<PathBuf>,
        display_name: impl Into<String>,
    ) -> Result<u16, ShareError> {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.range.len() {
            return Err(ShareError::CodeSpaceExhausted {
                min: self.range.min,
                max: self.range.max,
            });
        }

        let code = {
            let mut rng = rand::thread_rng();
            loop {
                let candidate = rng.gen_range(self.range.min..=self.range.max);
                if !entries.contains_key(&candidate) {
                    break candidate;
                }
            }
        };

        let offer = Offer {
            code,
            stored_path: stored_path.into(),
            display_name: display_name.into(),
        };
        debug!("Registered code {} for '{}'", code, offer.display_name);
        entries.insert(
            code,
            Entry {
                offer: Arc::new(offer),
                state: OfferState::Registered,
                stop: None,
            },
        );

        Ok(code)
    }

    pub async fn lookup(&self, code: u16) -> Option<Arc<Offer>> {
        let entries = self.entries.lock().await;
        entries.get(&code).map(|e| e.offer.clone())
    }

    pub async fn state(&self, code: u16) -> Option<OfferState> {
        let entries = self.entries.lock().await;
        entries.get(&code).map(|e| e.state)
    }

    /// 标记为正在监听，并保存用于关闭监听器的令牌
    pub async fn mark_serving(
        &self,
        code: u16,
        stop: CancellationToken,
    ) -> Result<Arc<Offer>, ShareError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(&code)
            .ok_or(ShareError::UnknownCode(code))?;
        if entry.state == OfferState::Serving {
            return Err(ShareError::AlreadyServing(code));
        }
        entry.state = OfferState::Serving;
        entry.stop = Some(stop);
        Ok(entry.offer.clone())
    }

    /// 移除映射，重复调用无副作用
    ///
    /// 返回该代码此前是否存在。
    pub async fn retire(&self, code: u16) -> bool {
        let mut entries = self.entries.lock().await;
        let removed = entries.remove(&code).is_some();
        if removed {
            debug!("Retired code {}", code);
        }
        removed
    }

    /// 关闭指定代码的监听器
    ///
    /// 映射在监听循环退出时才会被移除。代码不存在或尚未开始监听时返回 `false`。
    pub async fn stop(&self, code: u16) -> bool {
        let entries = self.entries.lock().await;
        match entries.get(&code).and_then(|e| e.stop.as_ref()) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 关闭所有监听器，并丢弃尚未开始监听的分享
    pub async fn shutdown(&self) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| match &entry.stop {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        });
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new(CodeRange::DYNAMIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_code_range() {
        let range = CodeRange::new(5000, 4000);
        assert_eq!((range.min, range.max), (4000, 5000));
        assert_eq!(range.len(), 1001);
        assert!(range.contains(4500));
        assert!(!range.contains(5001));
        assert_eq!(CodeRange::DYNAMIC.len(), 16384);
        assert!(!range.is_empty());
    }

    #[test]
    fn test_code_range_excludes_zero() {
        let range = CodeRange::new(0, 10);
        assert_eq!((range.min, range.max), (1, 10));
        assert!(!range.contains(0));

        let range = CodeRange::new(0, 0);
        assert_eq!((range.min, range.max), (1, 1));
        assert_eq!(range.len(), 1);
    }

    #[tokio::test]
    async fn test_offer_never_returns_zero() {
        let registry = PortRegistry::new(CodeRange::new(0, 1));
        assert_eq!(registry.offer("/a", "a").await.unwrap(), 1);
        assert!(registry.offer("/b", "b").await.is_err());
    }

    #[tokio::test]
    async fn test_offer_and_lookup() {
        let registry = PortRegistry::default();
        let code = registry.offer("/tmp/x_a.txt", "a.txt").await.unwrap();

        assert!(CodeRange::DYNAMIC.contains(code));
        let offer = registry.lookup(code).await.unwrap();
        assert_eq!(offer.code, code);
        assert_eq!(offer.display_name, "a.txt");
        assert_eq!(offer.stored_path, PathBuf::from("/tmp/x_a.txt"));
        assert_eq!(registry.state(code).await, Some(OfferState::Registered));
    }

    #[tokio::test]
    async fn test_retire_is_idempotent() {
        let registry = PortRegistry::default();
        let code = registry.offer("/tmp/f", "f").await.unwrap();

        assert!(registry.retire(code).await);
        assert!(registry.lookup(code).await.is_none());
        assert!(!registry.retire(code).await);
        assert!(registry.lookup(code).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_offers_are_distinct() {
        let registry = Arc::new(PortRegistry::new(CodeRange::new(30000, 30199)));

        let handles: Vec<_> = (0..150)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry
                        .offer(format!("/tmp/{i}"), format!("file-{i}"))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut codes = HashSet::new();
        for handle in handles {
            assert!(codes.insert(handle.await.unwrap()));
        }
        assert_eq!(codes.len(), 150);
        assert_eq!(registry.len().await, 150);
    }

    #[tokio::test]
    async fn test_code_space_exhausted() {
        let registry = PortRegistry::new(CodeRange::new(40000, 40001));
        let a = registry.offer("/a", "a").await.unwrap();
        let b = registry.offer("/b", "b").await.unwrap();
        assert_ne!(a, b);

        let err = registry.offer("/c", "c").await.unwrap_err();
        assert!(matches!(err, ShareError::CodeSpaceExhausted { .. }));

        // 退役后代码可以被重新使用
        registry.retire(a).await;
        assert_eq!(registry.offer("/c", "c").await.unwrap(), a);
    }

    #[tokio::test]
    async fn test_mark_serving_once() {
        let registry = PortRegistry::default();
        let code = registry.offer("/f", "f").await.unwrap();

        registry
            .mark_serving(code, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(registry.state(code).await, Some(OfferState::Serving));

        let err = registry
            .mark_serving(code, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::AlreadyServing(c) if c == code));

        let err = registry
            .mark_serving(code.wrapping_add(1), CancellationToken::new())
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_stop_and_shutdown() {
        let registry = PortRegistry::default();
        let serving = registry.offer("/s", "s").await.unwrap();
        let pending = registry.offer("/p", "p").await.unwrap();

        let token = CancellationToken::new();
        registry.mark_serving(serving, token.clone()).await.unwrap();

        assert!(!registry.stop(pending).await);
        assert!(registry.stop(serving).await);
        assert!(token.is_cancelled());

        registry.shutdown().await;
        // 监听中的分享由监听循环自己退役，未开始监听的直接丢弃
        assert!(registry.lookup(serving).await.is_some());
        assert!(registry.lookup(pending).await.is_none());
    }
}

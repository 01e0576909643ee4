//! 兼容层上下文。
//!
//! [`Shim`] 是所有流的共同入口：它持有宿主引擎、运行配置、后台任务派发器，
//! 以及 Reader 缓存与待填充视图两张侧表。所有状态都随句柄显式传递，不存在模块级可变全局量。

use std::{fmt, sync::Arc};

use crate::{
    config::{ConfigError, ShimConfig},
    host::NativeHost,
    recovery::RecoveryPolicy,
    registry::{PendingViews, ReaderRegistry},
    runtime::{DefaultSpawner, DetachedSpawner},
};

struct ShimInner {
    config: ShimConfig,
    host: Arc<dyn NativeHost>,
    spawner: Arc<dyn DetachedSpawner>,
    readers: ReaderRegistry,
    pending: Arc<PendingViews>,
}

/// 兼容层句柄，克隆开销为一次引用计数。
#[derive(Clone)]
pub struct Shim {
    inner: Arc<ShimInner>,
}

impl Shim {
    /// 以默认配置与默认派发器初始化。
    pub fn new(host: Arc<dyn NativeHost>) -> Self {
        let inner = ShimInner {
            config: ShimConfig::default(),
            host,
            spawner: Arc::new(DefaultSpawner::default()),
            readers: ReaderRegistry::default(),
            pending: Arc::new(PendingViews::default()),
        };
        let shim = Self {
            inner: Arc::new(inner),
        };
        shim.log_init();
        shim
    }

    pub fn builder(host: Arc<dyn NativeHost>) -> ShimBuilder {
        ShimBuilder {
            host,
            config: ShimConfig::default(),
            spawner: None,
        }
    }

    pub fn config(&self) -> &ShimConfig {
        &self.inner.config
    }

    pub fn policy(&self) -> RecoveryPolicy {
        RecoveryPolicy {
            max_attempts: self.inner.config.max_derivation_attempts,
            force_emulation: self.inner.config.force_polyfills,
        }
    }

    /// 当前缓存的流 → Reader 关联数量。
    pub fn cached_readers(&self) -> usize {
        self.inner.readers.len()
    }

    /// 当前登记中的待填充视图数量。
    pub fn pending_views(&self) -> usize {
        self.inner.pending.len()
    }

    pub(crate) fn host(&self) -> &dyn NativeHost {
        self.inner.host.as_ref()
    }

    pub(crate) fn spawner(&self) -> Arc<dyn DetachedSpawner> {
        Arc::clone(&self.inner.spawner)
    }

    pub(crate) fn readers(&self) -> &ReaderRegistry {
        &self.inner.readers
    }

    pub(crate) fn pending(&self) -> &Arc<PendingViews> {
        &self.inner.pending
    }

    fn log_init(&self) {
        let capabilities = self.inner.host.capabilities();
        tracing::debug!(
            force_polyfills = self.inner.config.force_polyfills,
            max_derivation_attempts = self.inner.config.max_derivation_attempts,
            native_byob = capabilities.native_byob,
            byte_streams = capabilities.byte_streams,
            "stream shim initialized"
        );
    }
}

impl fmt::Debug for Shim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shim")
            .field("config", &self.inner.config)
            .field("capabilities", &self.inner.host.capabilities())
            .field("cached_readers", &self.inner.readers.len())
            .finish()
    }
}

/// [`Shim`] 构造器。
pub struct ShimBuilder {
    host: Arc<dyn NativeHost>,
    config: ShimConfig,
    spawner: Option<Arc<dyn DetachedSpawner>>,
}

impl ShimBuilder {
    pub fn config(mut self, config: ShimConfig) -> Self {
        self.config = config;
        self
    }

    pub fn spawner(mut self, spawner: Arc<dyn DetachedSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// 校验配置并完成初始化。
    pub fn build(self) -> Result<Shim, ConfigError> {
        self.config.validate()?;
        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(DefaultSpawner::default()) as Arc<dyn DetachedSpawner>);
        let shim = Shim {
            inner: Arc::new(ShimInner {
                config: self.config,
                host: self.host,
                spawner,
                readers: ReaderRegistry::default(),
                pending: Arc::new(PendingViews::default()),
            }),
        };
        shim.log_init();
        Ok(shim)
    }
}

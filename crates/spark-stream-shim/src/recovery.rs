//! # recovery 模块说明
//!
//! ## 角色定位（Why）
//! 某些宿主在字节流上构造 BYOB Reader 时会因引擎内部状态失败，而不是因为调用方误用。
//! 此时把原流经响应体物化一次得到的新流通常可以正常工作，本模块负责这一有界重试。
//!
//! ## 契约要点（What）
//! - 尝试次数保存在 [`StreamTags::attempts`] 中，跨越整条流的生命周期单调递增；
//! - 尝试次数小于上限时，构造失败会触发 [`rederive`] 并重新获取；
//! - 达到上限时采用 [`AcquireStrategy::ForcedByob`]：显式以仿真 BYOB 获取，不再递归，
//!   失败即返回 [`StreamError::RecoveryExhausted`]；
//! - 上限对所有策略生效：普通模式获取在字节流上失败时同样最多重新派生到上限；
//! - 每次派生成功后立即写回流的 [`Backing`]，获取最终失败时派生结果与尝试次数也不会丢失；
//! - 已锁定的流直接返回 [`StreamError::Locked`]，不进入恢复流程。
//!
//! ## 实现策略（How）
//! 策略选择是纯函数 [`select_strategy`]，便于单测；获取流程以循环代替递归，
//! 每轮根据最新的标签重新选择策略。`parking_lot` 锁只在同步片段内持有。

use std::{fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{
    chunk::{ReaderMode, StreamType},
    error::{Result, StreamError},
    host::{HostCapabilities, NativeHost, NativeReader, NativeStream},
};

/// 随流迁移的模式标签。重新派生时原样复制到新流上，只递增尝试次数。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StreamTags {
    pub mode: ReaderMode,
    pub stream_type: StreamType,
    pub attempts: u32,
}

impl StreamTags {
    pub fn new(stream_type: StreamType) -> Self {
        Self {
            mode: ReaderMode::Default,
            stream_type,
            attempts: 0,
        }
    }

    /// 是否处于字节或 BYOB 模式，只有这类流会进入恢复流程。
    pub fn byte_oriented(&self) -> bool {
        self.mode == ReaderMode::Byob || self.stream_type == StreamType::Bytes
    }

    pub fn tag_byob(self) -> Self {
        Self {
            mode: ReaderMode::Byob,
            stream_type: StreamType::Bytes,
            ..self
        }
    }

    /// 按本次请求的模式更新标签：BYOB 请求打上 BYOB 标记，普通请求保持原样。
    pub fn requesting(self, mode: ReaderMode) -> Self {
        match mode {
            ReaderMode::Byob => self.tag_byob(),
            ReaderMode::Default => self,
        }
    }

    pub fn next_attempt(self) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            ..self
        }
    }
}

/// 恢复策略参数，来自 [`ShimConfig`](crate::ShimConfig)。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RecoveryPolicy {
    pub max_attempts: u32,
    /// 即使宿主支持原生 BYOB 也走仿真路径。
    pub force_emulation: bool,
}

/// 单轮获取所采用的策略。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AcquireStrategy {
    /// 普通 Reader。
    Default,
    /// 宿主原生 BYOB Reader。
    NativeByob,
    /// 原生普通 Reader 外加 BYOB 仿真。
    EmulatedByob,
    /// 达到尝试上限后的终局策略：仿真 BYOB，失败不再重试。
    ForcedByob,
}

/// 根据标签、策略与宿主能力选择本轮获取方式。
pub fn select_strategy(
    tags: &StreamTags,
    policy: RecoveryPolicy,
    capabilities: HostCapabilities,
) -> AcquireStrategy {
    if tags.mode != ReaderMode::Byob {
        return AcquireStrategy::Default;
    }
    if tags.attempts >= policy.max_attempts {
        return AcquireStrategy::ForcedByob;
    }
    if capabilities.native_byob && !policy.force_emulation {
        AcquireStrategy::NativeByob
    } else {
        AcquireStrategy::EmulatedByob
    }
}

/// 兼容层流背后的原生流及其标签。
#[derive(Clone)]
pub struct Backing {
    pub native: Arc<dyn NativeStream>,
    pub tags: StreamTags,
}

impl fmt::Debug for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backing")
            .field("tags", &self.tags)
            .field("locked", &self.native.locked())
            .finish()
    }
}

/// 获取成功的结果。实际使用的原生流已写回调用方的 [`Backing`]。
pub struct Acquired {
    pub reader: Arc<dyn NativeReader>,
    pub mode: ReaderMode,
    /// Reader 是否为宿主原生 BYOB。
    pub native_byob: bool,
}

/// 经响应体往返派生一条内容相同的新流，标签原样迁移且尝试次数加一。
pub async fn rederive(host: &dyn NativeHost, backing: &Backing) -> Result<Backing> {
    let native = host.materialize(Arc::clone(&backing.native)).await?;
    Ok(Backing {
        native,
        tags: backing.tags.next_attempt(),
    })
}

/// 获取 Reader，必要时执行有界的重新派生。
///
/// `slot` 是流当前的 [`Backing`]；模式标签与每次派生出的新流都会写回其中。
pub async fn acquire(
    host: &dyn NativeHost,
    slot: &Mutex<Backing>,
    requested: ReaderMode,
    policy: RecoveryPolicy,
) -> Result<Acquired> {
    let mut backing = slot.lock().clone();
    if backing.native.locked() {
        return Err(StreamError::Locked);
    }
    backing.tags = backing.tags.requesting(requested);
    let capabilities = host.capabilities();
    loop {
        let strategy = select_strategy(&backing.tags, policy, capabilities);
        let native_mode = match strategy {
            AcquireStrategy::NativeByob => ReaderMode::Byob,
            _ => ReaderMode::Default,
        };
        let err = match backing.native.get_reader(native_mode) {
            Ok(reader) => {
                let mode = backing.tags.mode;
                *slot.lock() = backing;
                return Ok(Acquired {
                    reader,
                    mode,
                    native_byob: strategy == AcquireStrategy::NativeByob,
                });
            }
            Err(err) => err,
        };
        if !err.is_construction_failure() || !backing.tags.byte_oriented() {
            return Err(err);
        }
        if strategy == AcquireStrategy::ForcedByob || backing.tags.attempts >= policy.max_attempts {
            return Err(StreamError::RecoveryExhausted {
                attempts: backing.tags.attempts,
                last: Box::new(err),
            });
        }
        tracing::warn!(
            attempt = backing.tags.attempts,
            strategy = ?strategy,
            error = %err,
            "reader construction failed, re-deriving stream through a response body"
        );
        backing = rederive(host, &backing).await?;
        *slot.lock() = backing.clone();
    }
}

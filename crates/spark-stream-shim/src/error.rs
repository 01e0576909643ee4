//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为兼容层对外暴露的全部失败路径提供单一错误域，调用方可以通过 `?` 直接传播；
//! - 通过 [`ErrorKind`] 把错误归入“获取 / 读取 / 误用 / 终止 / 生产端”五类，
//!   与迭代器、BYOB 仿真、恢复策略各自的吞吐规则一一对应。
//!
//! ## 设计要求（What）
//! - 所有变体实现 `Clone + PartialEq`，便于在 `closed()` 等多次观测的场景下复制错误；
//! - 每个变体都有稳定错误码（[`StreamError::code`]），日志字段只记录错误码与 Display 文本。

use thiserror::Error;

/// 兼容层统一的 `Result` 别名。
pub type Result<T, E = StreamError> = core::result::Result<T, E>;

/// 错误的处置类别。
///
/// - `Acquisition`：获取 Reader 失败（流已锁定、宿主构造失败、恢复耗尽），总是返回给调用方；
/// - `ReadTime`：BYOB 仿真读取期间的失败，会被本地降级为普通读取，不以独立类型外泄；
/// - `InvalidUsage`：对同一个 BYOB 请求重复应答等误用，同步返回给调用方；
/// - `Termination`：终止序列中的单步失败，总是被吞掉；
/// - `Stream`：生产端显式报错或流已进入终态。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Acquisition,
    ReadTime,
    InvalidUsage,
    Termination,
    Stream,
}

/// 兼容层错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：宿主原语、仿真层与恢复层都可能失败，调用方需要一个可匹配的枚举，
///   而不是解析字符串；
/// - **契约 (What)**：变体携带的上下文均为拥有所有权的数据，可跨线程移动；
///   [`RecoveryExhausted`](Self::RecoveryExhausted) 保留最后一次宿主错误；
/// - **权衡 (Trade-offs)**：生产端原因以 `String` 保存，牺牲结构化信息换取 `Clone + PartialEq`。
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum StreamError {
    /// 流已被另一个 Reader 锁定。
    #[error("stream is already locked to a reader")]
    Locked,

    /// Reader 已经释放锁，不能再读取。
    #[error("reader has released its lock on the stream")]
    Released,

    /// 宿主原生构造（流或 Reader）失败。
    #[error("native construction failed: {detail}")]
    Construction { detail: String },

    /// 有界重试全部失败。
    #[error("stream re-derivation gave up after {attempts} attempts: {last}")]
    RecoveryExhausted {
        attempts: u32,
        last: Box<StreamError>,
    },

    /// 同一个 BYOB 请求被第二次应答。
    #[error("byob request has already been responded to")]
    AlreadyResponded,

    /// 对象状态不允许当前操作。
    #[error("invalid state: {detail}")]
    InvalidState { detail: String },

    /// 视图区间越界或未按元素宽度对齐。
    #[error("view range rejected: {detail}")]
    Range { detail: String },

    /// 字节模式需要字节视图，却拿到了其它类型的块。
    #[error("chunk is not byte data (found {found})")]
    NotBytes { found: &'static str },

    /// 生产端调用了 `error()`，或 `start`/`pull` 返回失败。
    #[error("stream errored: {reason}")]
    Errored { reason: String },

    /// 目标不支持该操作（终止序列中的“缺失步骤”）。
    #[error("`{operation}` is not supported by this target")]
    Unsupported { operation: &'static str },

    /// 流已关闭。
    #[error("stream is closed")]
    Closed,
}

impl StreamError {
    /// 构造宿主构造失败错误。
    pub fn construction(detail: impl Into<String>) -> Self {
        Self::Construction {
            detail: detail.into(),
        }
    }

    /// 构造状态错误。
    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::InvalidState {
            detail: detail.into(),
        }
    }

    /// 构造区间错误。
    pub fn range(detail: impl Into<String>) -> Self {
        Self::Range {
            detail: detail.into(),
        }
    }

    /// 构造生产端错误。
    pub fn errored(reason: impl Into<String>) -> Self {
        Self::Errored {
            reason: reason.into(),
        }
    }

    /// 是否属于可以触发重新派生的构造失败。
    pub fn is_construction_failure(&self) -> bool {
        matches!(self, Self::Construction { .. })
    }

    /// 返回错误的处置类别。
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Locked | Self::Construction { .. } | Self::RecoveryExhausted { .. } => {
                ErrorKind::Acquisition
            }
            Self::NotBytes { .. } | Self::Range { .. } => ErrorKind::ReadTime,
            Self::AlreadyResponded | Self::InvalidState { .. } | Self::Released => {
                ErrorKind::InvalidUsage
            }
            Self::Unsupported { .. } => ErrorKind::Termination,
            Self::Errored { .. } | Self::Closed => ErrorKind::Stream,
        }
    }

    /// 稳定错误码，遵循 `<域>.<语义>` 约定。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Locked => "stream.locked",
            Self::Released => "reader.released",
            Self::Construction { .. } => "stream.construction",
            Self::RecoveryExhausted { .. } => "stream.recovery_exhausted",
            Self::AlreadyResponded => "byob.already_responded",
            Self::InvalidState { .. } => "stream.invalid_state",
            Self::Range { .. } => "view.range",
            Self::NotBytes { .. } => "chunk.not_bytes",
            Self::Errored { .. } => "stream.errored",
            Self::Unsupported { .. } => "target.unsupported",
            Self::Closed => "stream.closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_exhaustion_keeps_last_cause() {
        let err = StreamError::RecoveryExhausted {
            attempts: 3,
            last: Box::new(StreamError::construction("engine refused byob reader")),
        };
        assert_eq!(err.kind(), ErrorKind::Acquisition);
        assert_eq!(err.code(), "stream.recovery_exhausted");
        assert!(err.to_string().contains("engine refused byob reader"));
    }

    #[test]
    fn double_respond_is_invalid_usage() {
        assert_eq!(
            StreamError::AlreadyResponded.kind(),
            ErrorKind::InvalidUsage
        );
        assert!(!StreamError::AlreadyResponded.is_construction_failure());
        assert!(StreamError::construction("x").is_construction_failure());
    }
}

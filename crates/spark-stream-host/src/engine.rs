//! # engine 模块说明
//!
//! ## 角色定位（Why）
//! [`MemoryHost`] 是宿主原语的内存参考实现。它可以按 [`EngineProfile`] 复现兼容层需要兜底的宿主行为：
//! 不支持原生 BYOB、不支持字节流、字节流上构造 BYOB Reader 偶发或必然失败。
//!
//! ## 契约要点（What）
//! - 获取 BYOB Reader 的检查顺序：已锁定 → 不支持原生 BYOB → 非字节流 → 画像中的构造缺陷；
//!   检查失败时流保持未锁定；
//! - `FailFirst(n)` 的计数在同一个引擎内共享，跨越重新派生得到的新流；
//! - [`NativeHost::materialize`] 经 [`Response`] 往返，支持字节流时得到字节流。

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use spark_stream_shim::{
    HostCapabilities, NativeHost, NativeSource, NativeStream, Result, StreamError, StreamType,
};

use crate::{
    body::{Body, Response},
    stream::MemoryStream,
};

/// 字节流上构造原生 BYOB Reader 的可靠性。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ByobConstruction {
    #[default]
    Reliable,
    /// 引擎内前 N 次构造失败，之后成功。
    FailFirst(u32),
    AlwaysFail,
}

/// 引擎画像。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EngineProfile {
    pub native_byob: bool,
    pub byte_streams: bool,
    pub byob_construction: ByobConstruction,
}

impl EngineProfile {
    /// 完整支持字节流与原生 BYOB。
    pub const fn conforming() -> Self {
        Self {
            native_byob: true,
            byte_streams: true,
            byob_construction: ByobConstruction::Reliable,
        }
    }

    /// 只支持默认流与复制读取。
    pub const fn default_reads_only() -> Self {
        Self {
            native_byob: false,
            byte_streams: false,
            byob_construction: ByobConstruction::Reliable,
        }
    }

    /// 声明支持原生 BYOB，但构造 BYOB Reader 总是失败。
    pub const fn broken_byob() -> Self {
        Self {
            native_byob: true,
            byte_streams: true,
            byob_construction: ByobConstruction::AlwaysFail,
        }
    }

    /// 前 `failures` 次构造 BYOB Reader 失败。
    pub const fn flaky_byob(failures: u32) -> Self {
        Self {
            native_byob: true,
            byte_streams: true,
            byob_construction: ByobConstruction::FailFirst(failures),
        }
    }
}

impl Default for EngineProfile {
    fn default() -> Self {
        Self::conforming()
    }
}

pub(crate) struct EngineState {
    profile: EngineProfile,
    byob_constructions: AtomicU32,
}

impl EngineState {
    pub(crate) fn profile(&self) -> EngineProfile {
        self.profile
    }

    /// 按画像判定一次 BYOB Reader 构造是否成功。
    pub(crate) fn admit_byob(&self) -> Result<()> {
        match self.profile.byob_construction {
            ByobConstruction::Reliable => Ok(()),
            ByobConstruction::AlwaysFail => Err(StreamError::construction(
                "engine rejected byob reader construction",
            )),
            ByobConstruction::FailFirst(failures) => {
                let seen = self.byob_constructions.fetch_add(1, Ordering::AcqRel);
                if seen < failures {
                    Err(StreamError::construction(format!(
                        "engine rejected byob reader construction ({} of {failures})",
                        seen + 1
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// 内存宿主引擎，克隆后共享同一份引擎状态。
#[derive(Clone)]
pub struct MemoryHost {
    engine: Arc<EngineState>,
}

impl MemoryHost {
    pub fn new(profile: EngineProfile) -> Self {
        Self {
            engine: Arc::new(EngineState {
                profile,
                byob_constructions: AtomicU32::new(0),
            }),
        }
    }

    pub fn profile(&self) -> EngineProfile {
        self.engine.profile
    }

    /// 构造具体类型的内存流。
    pub fn construct_stream(
        &self,
        source: Arc<dyn NativeSource>,
        stream_type: StreamType,
    ) -> Result<Arc<MemoryStream>> {
        if stream_type == StreamType::Bytes && !self.engine.profile.byte_streams {
            return Err(StreamError::construction(
                "engine does not support byte streams",
            ));
        }
        Ok(MemoryStream::new(
            Arc::clone(&self.engine),
            source,
            stream_type,
        ))
    }

    /// 物化生成的响应体类型。
    pub(crate) fn body_type(&self) -> StreamType {
        if self.engine.profile.byte_streams {
            StreamType::Bytes
        } else {
            StreamType::Default
        }
    }
}

#[async_trait]
impl NativeHost for MemoryHost {
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            native_byob: self.engine.profile.native_byob,
            byte_streams: self.engine.profile.byte_streams,
        }
    }

    fn construct(
        &self,
        source: Arc<dyn NativeSource>,
        stream_type: StreamType,
    ) -> Result<Arc<dyn NativeStream>> {
        let stream: Arc<dyn NativeStream> = self.construct_stream(source, stream_type)?;
        Ok(stream)
    }

    async fn materialize(&self, stream: Arc<dyn NativeStream>) -> Result<Arc<dyn NativeStream>> {
        let response = Response::new(self, Body::Stream(stream))?;
        response
            .body()
            .ok_or_else(|| StreamError::invalid_state("materialized response has no body"))
    }
}

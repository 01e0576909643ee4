//! 集成测试共享夹具。
#![allow(dead_code)]

use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use spark_stream_host::{EngineProfile, MemoryHost};
use spark_stream_shim::{
    ByteView, Chunk, ReadResult, Result, Shim, ShimConfig, StreamController, UnderlyingSource,
};

/// 以给定画像与默认配置初始化兼容层。
pub fn shim_for(profile: EngineProfile) -> Shim {
    Shim::new(Arc::new(MemoryHost::new(profile)))
}

pub fn shim_with(profile: EngineProfile, config: ShimConfig) -> Shim {
    Shim::builder(Arc::new(MemoryHost::new(profile)))
        .config(config)
        .build()
        .expect("test config is valid")
}

/// 让出执行权若干次，使后台终止任务跑完。
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// 每次 `pull` 入队一个预设块，耗尽后关闭。
pub struct ScriptedSource {
    chunks: Mutex<VecDeque<Chunk>>,
}

impl ScriptedSource {
    pub fn new<C: Into<Chunk>>(chunks: impl IntoIterator<Item = C>) -> Self {
        Self {
            chunks: Mutex::new(chunks.into_iter().map(Into::into).collect()),
        }
    }

    pub fn bytes(chunks: &[&[u8]]) -> Self {
        Self::new(chunks.iter().map(|chunk| chunk.to_vec()))
    }
}

#[async_trait]
impl UnderlyingSource for ScriptedSource {
    async fn pull(&self, controller: &StreamController) -> Result<()> {
        let next = self.chunks.lock().pop_front();
        match next {
            Some(chunk) => controller.enqueue(chunk),
            None => controller.close(),
        }
    }
}

/// 读取结果中的字节视图。
pub fn view_of(result: &ReadResult) -> ByteView {
    match &result.value {
        Some(Chunk::Bytes(view)) => view.clone(),
        other => panic!("expected a byte view, got {other:?}"),
    }
}

pub fn conforming() -> EngineProfile {
    EngineProfile::conforming()
}

pub fn copying() -> EngineProfile {
    EngineProfile::default_reads_only()
}

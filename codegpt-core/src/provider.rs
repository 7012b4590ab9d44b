use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::error::{CodeGptError, CoreResult};
use crate::model::ChatCompletionRequest;

/// Raw body reads of a streamed response, in arrival order.
pub type ByteStream = futures::stream::BoxStream<'static, CoreResult<Bytes>>;

/// Something that can open a streamed chat completion.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    fn name(&self) -> &str;

    /// Resolves once response headers are in; errors here are transport failures.
    async fn open_stream(&self, req: &ChatCompletionRequest) -> CoreResult<ByteStream>;
}

/// Replays a fixed list of body reads, optionally pausing between them.
/// Useful for tests and offline demos.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    reads: Vec<Bytes>,
    pause: Option<Duration>,
}

impl ScriptedSource {
    pub fn new<I, B>(reads: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            reads: reads.into_iter().map(Into::into).collect(),
            pause: None,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }
}

#[async_trait]
impl CompletionSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open_stream(&self, _req: &ChatCompletionRequest) -> CoreResult<ByteStream> {
        let reads = self.reads.clone();
        let pause = self.pause;
        let stream = futures::stream::iter(reads).then(move |b| async move {
            if let Some(p) = pause {
                tokio::time::sleep(p).await;
            }
            Ok::<_, CodeGptError>(b)
        });
        Ok(stream.boxed())
    }
}

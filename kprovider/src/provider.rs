use std::future::Future;
use std::pin::Pin;

use crate::{BoxedEventStream, GatewayError, InferenceRequest, InferenceResponse};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The only seam that reaches the hosted model. Implementations classify their
/// failures into [`GatewayError`] kinds; retrying is the gateway's job.
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn complete<'a>(
        &'a self,
        request: InferenceRequest,
    ) -> ProviderFuture<'a, Result<InferenceResponse, GatewayError>>;

    fn stream<'a>(
        &'a self,
        request: InferenceRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, GatewayError>>;
}

//! Dispatch pipeline shared by the unary and streaming endpoints
//!
//! validate, rate-limit, resolve, invoke. Every outcome carries the
//! request id of the context it was dispatched with.

use crate::domain::{ChatCompletionPayload, ChatRequest, ChatResponse, RequestContext, RequestId};
use crate::providers::{ChunkStream, Provider, ProviderError, ProviderName, ProviderRegistry};
use crate::proxy::metrics::{MetricsRecorder, ProviderOperation, OUTCOME_SUCCESS};
use crate::proxy::model_router::ModelRouter;
use crate::proxy::rate_limiter::{RateDecision, RateLimiter};
use crate::proxy::types::{ProxyError, ProxyFailure};
use crate::proxy::validation::validate;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Unary,
    Streaming,
}

/// A successful dispatch with the provider that served it
pub struct Dispatched<T> {
    pub request_id: RequestId,
    pub provider: ProviderName,
    pub value: T,
}

impl<T> fmt::Debug for Dispatched<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatched")
            .field("request_id", &self.request_id)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum ProxyReply {
    Completion(Dispatched<ChatResponse>),
    Stream(Dispatched<ChunkStream>),
}

impl ProxyReply {
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::Completion(reply) => &reply.request_id,
            Self::Stream(reply) => &reply.request_id,
        }
    }
}

struct Prepared {
    request: ChatRequest,
    provider_name: ProviderName,
    provider: Arc<dyn Provider>,
}

pub struct ProxyOrchestrator {
    registry: Arc<ProviderRegistry>,
    router: ModelRouter,
    limiter: Arc<RateLimiter>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl ProxyOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        router: ModelRouter,
        limiter: Arc<RateLimiter>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            registry,
            router,
            limiter,
            metrics,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Every check that must pass before a provider is contacted
    fn prepare(
        &self,
        payload: ChatCompletionPayload,
        context: &RequestContext,
    ) -> Result<Prepared, ProxyError> {
        let request = validate(payload)?;

        if let RateDecision::Rejected {
            retry_after_seconds,
        } = self.limiter.check(&context.client_identity)
        {
            return Err(ProxyError::RateLimited {
                retry_after_seconds,
            });
        }

        let provider_name = self.router.route(request.model()).clone();
        let provider = self.registry.resolve_provider(&provider_name)?;

        Ok(Prepared {
            request,
            provider_name,
            provider,
        })
    }

    fn observe<T>(
        &self,
        provider: &ProviderName,
        operation: ProviderOperation,
        started: Instant,
        result: &Result<T, ProviderError>,
    ) {
        let duration = started.elapsed();
        let outcome = match result {
            Ok(_) => OUTCOME_SUCCESS,
            Err(error) => error.outcome(),
        };
        self.metrics
            .record_provider_call(provider.as_ref(), operation, outcome, duration);

        match result {
            Ok(_) => info!(
                provider = %provider,
                operation = operation.as_str(),
                outcome,
                duration_ms = duration.as_millis() as u64,
                "Provider call completed"
            ),
            Err(error) => warn!(
                provider = %provider,
                operation = operation.as_str(),
                outcome,
                duration_ms = duration.as_millis() as u64,
                error = %error,
                "Provider call failed"
            ),
        }
    }

    #[instrument(skip_all, fields(request_id = %context.request_id, model = %payload.model))]
    pub async fn complete(
        &self,
        payload: ChatCompletionPayload,
        context: &RequestContext,
    ) -> Result<Dispatched<ChatResponse>, ProxyFailure> {
        let fail = |error: ProxyError| ProxyFailure::new(context.request_id.clone(), error);
        let prepared = self.prepare(payload, context).map_err(fail)?;

        let started = Instant::now();
        let result = prepared
            .provider
            .generate(&prepared.request, context)
            .await;
        self.observe(
            &prepared.provider_name,
            ProviderOperation::Generate,
            started,
            &result,
        );

        let value = result.map_err(|error| fail(error.into()))?;
        Ok(Dispatched {
            request_id: context.request_id.clone(),
            provider: prepared.provider_name,
            value,
        })
    }

    #[instrument(skip_all, fields(request_id = %context.request_id, model = %payload.model))]
    pub async fn stream(
        &self,
        payload: ChatCompletionPayload,
        context: &RequestContext,
    ) -> Result<Dispatched<ChunkStream>, ProxyFailure> {
        let fail = |error: ProxyError| ProxyFailure::new(context.request_id.clone(), error);
        let prepared = self.prepare(payload, context).map_err(fail)?;

        let started = Instant::now();
        let result = prepared.provider.stream(&prepared.request, context).await;
        self.observe(
            &prepared.provider_name,
            ProviderOperation::Stream,
            started,
            &result,
        );

        let value = result.map_err(|error| fail(error.into()))?;
        Ok(Dispatched {
            request_id: context.request_id.clone(),
            provider: prepared.provider_name,
            value,
        })
    }

    pub async fn handle(
        &self,
        payload: ChatCompletionPayload,
        context: &RequestContext,
        mode: DispatchMode,
    ) -> Result<ProxyReply, ProxyFailure> {
        match mode {
            DispatchMode::Unary => self.complete(payload, context).await.map(ProxyReply::Completion),
            DispatchMode::Streaming => self.stream(payload, context).await.map(ProxyReply::Stream),
        }
    }
}

//! Handles profile uploads from Pyroscope compatible agents.
//!
//! Agents send a gzip compressed recording as the file part of a multipart form. The query string
//! carries the application name with labels and the profiled time window:
//!
//! ```text
//! POST /ingest?from=<secs>&until=<secs>&name=<app>{k=v,...}&format=jfr[&sampleRate=<hz>]
//! ```

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::BytesMut;
use ember_log::LogError;
use ember_profiling::Decoder;
use multer::Field;

use crate::context::{DeadlineExceeded, RequestContext};
use crate::endpoints::common::BadIngestRequest;
use crate::processing;
use crate::service::ServiceState;
use crate::utils::{self, IngestQuery, MultipartError};

/// Processes an upload within the configured request timeout.
///
/// The upload is processed on a separate task. If the deadline passes first, the client receives
/// a timeout response immediately and the task stops at its next checkpoint.
pub async fn handle(State(state): State<ServiceState>, request: Request) -> Response {
    let ctx = RequestContext::new(state.config().request_timeout());
    let result = run(&state, &ctx, request).await;

    let error_code = match &result {
        Ok(_) => "success",
        Err(error) => error.error_code(),
    };
    state
        .metrics()
        .record_request(ctx.service(), error_code, ctx.elapsed());

    match result {
        Ok(status) => status.into_response(),
        Err(error) => {
            log_error(&ctx, &error);
            error.into_response()
        }
    }
}

async fn run(
    state: &ServiceState,
    ctx: &RequestContext,
    request: Request,
) -> Result<StatusCode, BadIngestRequest> {
    let task = tokio::spawn({
        let state = state.clone();
        let ctx = ctx.clone();
        async move {
            tokio::select! {
                biased;
                () = ctx.cancelled() => Err(DeadlineExceeded.into()),
                result = process(&state, &ctx, request) => result,
            }
        }
    });

    match tokio::time::timeout_at(ctx.deadline(), task).await {
        Ok(Ok(result)) => result,
        Ok(Err(error)) => Err(BadIngestRequest::Internal(error)),
        Err(_) => {
            ctx.cancel();
            Err(BadIngestRequest::Timeout(state.config().request_timeout()))
        }
    }
}

async fn process(
    state: &ServiceState,
    ctx: &RequestContext,
    request: Request,
) -> Result<StatusCode, BadIngestRequest> {
    let (mut parts, body) = request.into_parts();

    let IngestQuery {
        params,
        metadata,
        format,
    } = IngestQuery::parse(parts.uri.query())?;
    ctx.set_service(&params.name);

    // Query errors take precedence over the method.
    if parts.method != Method::POST {
        return Err(BadIngestRequest::MethodNotAllowed);
    }

    let format = format.unwrap_or_default();
    let parser = state.parsers().get(&format).ok_or_else(|| {
        let supported: Vec<_> = state.parsers().supported().collect();
        BadIngestRequest::UnsupportedFormat(supported.join(", "))
    })?;

    let config = state.config();
    let field =
        utils::extract_file_part(&parts.headers, body, &format, config.max_request_body_size())
            .await?;
    utils::reset_headers(&mut parts.headers);

    let mut buffer = state.buffer_pool().get();
    let size = decompress(field, &mut buffer, config.max_decompressed_size(), ctx).await?;
    state
        .metrics()
        .record_uncompressed_size(&params.name, size);
    ctx.check()?;

    let profiles = parser.parse(&buffer, &metadata)?;
    ctx.check()?;

    let batch = processing::assemble(ctx.request_id(), &params, profiles);
    state
        .metrics()
        .record_parsed_size(&params.name, batch.payload_size());

    if batch.is_empty() {
        ember_log::debug!(service = params.name.as_str(), "upload contains no profiles");
        return Ok(StatusCode::NO_CONTENT);
    }

    ctx.check()?;
    state.consumer().consume(batch).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Streams the compressed file part into `buffer` and returns the decompressed size.
async fn decompress(
    mut field: Field<'static>,
    buffer: &mut BytesMut,
    limit: usize,
    ctx: &RequestContext,
) -> Result<usize, BadIngestRequest> {
    let mut decoder = Decoder::new(buffer, limit);

    while let Some(chunk) = field.chunk().await.map_err(MultipartError::Invalid)? {
        ctx.check()?;
        decoder.decode(&chunk)?;
    }

    Ok(decoder.finish()?)
}

fn log_error(ctx: &RequestContext, error: &BadIngestRequest) {
    let service = ctx.service();
    let request_id = ctx.request_id();

    match error.status() {
        StatusCode::INTERNAL_SERVER_ERROR => ember_log::error!(
            %request_id,
            service,
            "failed to ingest profile: {}",
            LogError(error)
        ),
        StatusCode::REQUEST_TIMEOUT => ember_log::warn!(
            %request_id,
            service,
            elapsed = ?ctx.elapsed(),
            "ingest request timed out"
        ),
        _ => ember_log::debug!(
            %request_id,
            service,
            "rejected ingest request: {}",
            LogError(error)
        ),
    }
}

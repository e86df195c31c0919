//! Play endpoint
//!
//! Outcomes: a chunked byte stream from the relay process, a `302` to the
//! resolved link in redirect mode, `429` while the channel cools down, or
//! `503` once every MAC and fallback sibling is exhausted.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{error, info};

use crate::services::Resolution;
use crate::web::{
    AppState,
    extractors::{ClientAddr, PlayParams},
};

pub async fn play(
    State(state): State<AppState>,
    Path((portal_id, channel_id)): Path<(String, String)>,
    Query(params): Query<PlayParams>,
    ClientAddr(client): ClientAddr,
) -> Response {
    info!(
        "Play request for Portal({}):Channel({}) from {}",
        portal_id, channel_id, client
    );

    let resolution = match state.resolver.resolve(&portal_id, &channel_id, params.is_web()).await {
        Ok(resolution) => resolution,
        Err(e) => {
            error!("Resolving Portal({}):Channel({}) failed: {}", portal_id, channel_id, e);
            return no_streams();
        }
    };

    match resolution {
        Resolution::Streaming(stream) => match &stream.relay_command {
            Some(command) => match state.relay.relay(&stream, command, &client) {
                Ok(body) => (
                    [(header::CONTENT_TYPE, "application/octet-stream")],
                    Body::from_stream(body),
                )
                    .into_response(),
                Err(e) => {
                    error!("Relay for {} could not start: {}", stream.link, e);
                    no_streams()
                }
            },
            None => (StatusCode::FOUND, [(header::LOCATION, stream.link)]).into_response(),
        },
        Resolution::Cooldown { remaining_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            format!("Channel is cooling down, retry in {} seconds", remaining_secs),
        )
            .into_response(),
        Resolution::NoStreamsAvailable => no_streams(),
    }
}

fn no_streams() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "No streams available").into_response()
}

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use serde::Deserialize;

use super::context_error;
use crate::{audio::MediaTrack, server::AppState};

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

/// Interleaved i16 samples as little-endian bytes.
pub fn encode_frame(frame: &[i16]) -> Bytes {
    let mut buf = vec![0u8; frame.len() * 2];
    LittleEndian::write_i16_into(frame, &mut buf);
    Bytes::from(buf)
}

/// Stream the track's frames as raw s16le stereo PCM. The track stops
/// when the client goes away.
pub fn pcm_response(track: MediaTrack, sample_rate: u32) -> Response {
    let frames = futures::stream::unfold(track, |track| async move {
        let frame = track.frames()?.recv_async().await.ok()?;
        Some((Ok::<_, std::io::Error>(encode_frame(&frame)), track))
    });

    let content_type = format!("audio/L16;rate={};channels=2", sample_rate);
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

/// GET /v1/output/stream
pub async fn output_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::info!("GET /v1/output/stream");
    match state.engine.subscribe_normal_output().await {
        Ok(track) => pcm_response(track, state.engine.session().config().sample_rate),
        Err(e) => context_error(&e, "/v1/output/stream"),
    }
}

/// PUT /v1/output/muted
pub async fn set_muted(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MuteRequest>,
) -> StatusCode {
    tracing::info!("PUT /v1/output/muted: {}", body.muted);
    state.engine.set_normal_output_muted(body.muted);
    StatusCode::NO_CONTENT
}

//! Turning recorded outcomes back into interceptor responses.

use crate::cassette::RecordedOutcome;
use crate::error::Result;
use crate::headers::to_header_map;
use crate::interceptor::{AbortReason, Fulfillment};
use crate::temporal::{apply_cache_config_at, reconstruct_cookies_header_at};
use chrono::{DateTime, Utc};
use hyper::header::SET_COOKIE;

/// How a recorded outcome is replayed.
#[derive(Debug, Clone, PartialEq)]
pub enum Replay {
    Fulfill(Fulfillment),
    Abort(AbortReason),
}

/// Build the replay for an outcome with timestamps relative to `now`.
pub fn replay_for(outcome: &RecordedOutcome, now: DateTime<Utc>) -> Result<Replay> {
    match outcome {
        RecordedOutcome::Abort { error_text, .. } => {
            Ok(Replay::Abort(AbortReason::from_error_text(error_text)))
        }
        RecordedOutcome::Response {
            response,
            set_cookies,
            cache_config,
            ..
        } => {
            let mut headers = response.headers.clone();
            if !set_cookies.is_empty() {
                headers.insert(
                    SET_COOKIE.as_str().to_string(),
                    reconstruct_cookies_header_at(set_cookies, now),
                );
            }
            apply_cache_config_at(&mut headers, cache_config, now);

            let body = match &response.body {
                Some(body) => Some(body.decode()?),
                None => None,
            };
            Ok(Replay::Fulfill(Fulfillment {
                status: response.status,
                headers: to_header_map(&headers),
                body,
            }))
        }
    }
}

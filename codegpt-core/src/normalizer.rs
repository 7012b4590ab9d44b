use crate::model::{ChatCompletionRequest, Role};
use unicode_normalization::UnicodeNormalization;

/// Unicode NFC normalization + BOM strip + CRLF -> LF + trim.
pub fn normalize_prompt(s: &str) -> String {
    let mut t = s.nfc().collect::<String>();
    if t.starts_with('\u{FEFF}') {
        t.remove(0);
    }
    if t.contains("\r\n") {
        t = t.replace("\r\n", "\n");
    }
    t.trim().to_string()
}

fn clamp_round_f32(x: f32, lo: f32, hi: f32, dp: u32) -> f32 {
    if x.is_nan() {
        return lo;
    }
    let clamped = x.clamp(lo, hi);
    let p = 10f32.powi(dp as i32);
    (clamped * p).round() / p
}

const MAX_TOKENS_CAP: u32 = 100_000;

/// Only user text is normalized; the system message carries file contents verbatim.
pub fn normalize_request(mut req: ChatCompletionRequest) -> ChatCompletionRequest {
    for msg in req.messages.iter_mut().filter(|m| m.role == Role::User) {
        msg.content = normalize_prompt(&msg.content);
    }
    req.model = req.model.trim().to_string();
    req.temperature = clamp_round_f32(req.temperature, 0.0, 2.0, 3);
    req.max_tokens = req.max_tokens.clamp(1, MAX_TOKENS_CAP);
    req.stream = true;
    req
}

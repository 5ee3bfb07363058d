use chrono::NaiveDateTime;

/// Wall-clock format used in the persisted store, second resolution.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ─── Record types ────────────────────────────────────────────────

/// One observation of one probe attempt.
/// Created once by the probe executor, appended once to the store,
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    /// Instant the probe began. Non-decreasing across one run.
    pub timestamp: NaiveDateTime,
    /// Backend variant probed. Rows written before the column was
    /// added carry no model and are excluded from per-model grouping.
    pub model: Option<String>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        first_token_latency_ms: f64,
        total_latency_ms: f64,
        tokens_per_second: f64,
        completion_tokens: u64,
        prompt_tokens: u64,
    },
    Failure {
        kind: ErrorKind,
        /// Raw error text, preserved verbatim (newlines stripped on write).
        detail: String,
    },
}

impl SampleRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }
}

// ─── Error classification ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Backend rejected or failed the request.
    ApiError,
    /// Prompt exceeded the model's context window.
    ContextWindowExceeded,
    /// Stream completed without ever yielding a content chunk.
    NoTokenProduced,
    /// Anything else (transport failures, decode errors, ...).
    Other,
}

/// Ordered substring rules, first match wins. Case-sensitive.
/// More specific kinds outrank `ApiError`, so a detail carrying both
/// markers (e.g. an API error body mentioning "context length")
/// classifies as the overflow.
const CLASSIFICATION_RULES: &[(&str, ErrorKind)] = &[
    ("NoTokenProduced", ErrorKind::NoTokenProduced),
    ("ContextWindowExceeded", ErrorKind::ContextWindowExceeded),
    ("context length", ErrorKind::ContextWindowExceeded),
    ("APIError", ErrorKind::ApiError),
];

/// Classify raw error text. This is a heuristic over the stringified
/// error, not a structural parse; unmatched text falls back to `Other`
/// so every failure ends up with exactly one kind.
pub fn classify_error(detail: &str) -> ErrorKind {
    CLASSIFICATION_RULES
        .iter()
        .find(|(needle, _)| detail.contains(needle))
        .map(|&(_, kind)| kind)
        .unwrap_or(ErrorKind::Other)
}

// ─── Durable row form ────────────────────────────────────────────

/// Column count of the current row format.
pub const FIELD_COUNT: usize = 8;

impl SampleRecord {
    /// Encode as one comma-separated row:
    /// `timestamp,first_token_latency_ms,total_latency_ms,tokens_per_second,completion_tokens,prompt_tokens,error,model`
    ///
    /// Failure rows leave the numeric columns empty; success rows leave
    /// the error column empty. Newlines in the error text are flattened
    /// so the store stays line-oriented; embedded commas are written
    /// as-is and surface as malformed rows on replay.
    pub fn to_row(&self) -> String {
        let ts = self.timestamp.format(TIMESTAMP_FORMAT);
        let model = self.model.as_deref().unwrap_or("");
        match &self.outcome {
            Outcome::Success {
                first_token_latency_ms,
                total_latency_ms,
                tokens_per_second,
                completion_tokens,
                prompt_tokens,
            } => format!(
                "{ts},{first_token_latency_ms},{total_latency_ms},{tokens_per_second},{completion_tokens},{prompt_tokens},,{model}"
            ),
            Outcome::Failure { detail, .. } => {
                let flat = detail.replace(['\n', '\r'], " ");
                format!("{ts},,,,,,{flat},{model}")
            }
        }
    }

    /// Parse one non-header row. Accepts the current 8-field format as
    /// well as the two historical ones: 7 fields (no model column) and
    /// 6 fields (no error column either — such rows are always
    /// successes). Returns `None` for anything structurally off, which
    /// the store then surfaces as a malformed-line marker.
    pub fn parse_row(line: &str) -> Option<SampleRecord> {
        let fields: Vec<&str> = line.split(',').collect();

        let (error, model) = match fields.len() {
            FIELD_COUNT => (fields[6], Some(fields[7])),
            7 => (fields[6], None),
            6 => ("", None),
            _ => return None,
        };

        let timestamp =
            NaiveDateTime::parse_from_str(fields[0], TIMESTAMP_FORMAT).ok()?;
        let model = model
            .filter(|m| !m.is_empty())
            .map(|m| m.to_string());

        let outcome = if error.is_empty() {
            Outcome::Success {
                first_token_latency_ms: fields[1].parse().ok()?,
                total_latency_ms: fields[2].parse().ok()?,
                tokens_per_second: fields[3].parse().ok()?,
                completion_tokens: fields[4].parse().ok()?,
                prompt_tokens: fields[5].parse().ok()?,
            }
        } else {
            Outcome::Failure {
                kind: classify_error(error),
                detail: error.to_string(),
            }
        };

        Some(SampleRecord {
            timestamp,
            model,
            outcome,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────

//! Per-request log lines and run summary formatting.

use std::time::Duration;

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use conv_common::{format_matrix, ConvError, ConvolutionRequest, ConvolutionResponse, Matrix};
use tracing::{info, warn};

use crate::metrics::RunSummary;

/// Cell payload of all result matrices in bytes.
pub fn result_bytes(response: &ConvolutionResponse) -> u64 {
    response.result.iter().map(Matrix::byte_size).sum()
}

/// Log a successful round-trip.
pub fn log_completion(request_id: u64, response: &ConvolutionResponse, latency: Duration) {
    info!(
        request_id,
        response_id = response.id,
        duration_ms = latency.as_millis() as u64,
        results = response.result.len(),
        result_bytes = result_bytes(response),
        "Request #{} -> Response: (#{}) in {} ms, Results: {}",
        request_id,
        response.id,
        latency.as_millis(),
        response.result.len()
    );
}

/// Log a lifecycle that ended without a response.
pub fn log_failure(request_id: u64, error: &ConvError) {
    match error {
        ConvError::RequestTooLarge { expected, limit } => warn!(
            request_id,
            expected_size = expected,
            limit,
            "Request #{} NOT SENT -> Size must be lower than: {}",
            request_id,
            limit
        ),
        ConvError::Remote { message, details } => warn!(
            request_id,
            remote_message = %message,
            details = ?details,
            "Request #{} -> Unsuccessful! {}: {:?}",
            request_id,
            message,
            details
        ),
        other => warn!(
            request_id,
            kind = ?other.kind(),
            error = %other,
            "Request #{} -> Unsuccessful! {}",
            request_id,
            other
        ),
    }
}

/// Text dump of every matrix involved in one round-trip.
pub fn format_round_trip(request: &ConvolutionRequest, response: &ConvolutionResponse) -> String {
    let mut blocks = vec![format_matrix("Target", &request.target)];
    blocks.extend(
        request
            .kernel
            .iter()
            .enumerate()
            .map(|(i, kernel)| format_matrix(&format!("Kernel {}", i), kernel)),
    );
    blocks.extend(
        response
            .result
            .iter()
            .enumerate()
            .map(|(i, result)| format_matrix(&format!("Result {}", i), result)),
    );
    blocks.join("\n")
}

/// Log the verbose matrix dump for a round-trip.
pub fn log_round_trip(request_id: u64, request: &ConvolutionRequest, response: &ConvolutionResponse) {
    info!(request_id, "\n{}", format_round_trip(request, response));
}

/// Formats run summaries for output.
pub struct ResultsReport;

impl ResultsReport {
    /// Format the summary as a console table.
    pub fn format_table(summary: &RunSummary) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!("Convolution Load Run: {}", summary.front_url)]);

        table.add_row(vec!["Duration:", &format!("{:.1}s", summary.duration_secs)]);
        table.add_row(vec!["Requests:", &summary.total_requests.to_string()]);
        table.add_row(vec![
            "Success Rate:",
            &format!("{:.1}%", summary.success_rate()),
        ]);
        table.add_row(vec![
            "Failures:",
            &format!(
                "{} too large / {} transport / {} input / {} lost",
                summary.rejected_too_large,
                summary.transport_failures,
                summary.invalid_input,
                summary.lost
            ),
        ]);
        table.add_row(vec!["Results:", &summary.results_total.to_string()]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Latency (ms)", "min / p50 / p90 / p99 / max"]);
        table.add_row(vec![
            "",
            &format!(
                "{:.1} / {:.1} / {:.1} / {:.1} / {:.1}",
                summary.latency_min,
                summary.latency_p50,
                summary.latency_p90,
                summary.latency_p99,
                summary.latency_max
            ),
        ]);

        table.to_string()
    }

    /// Format the summary as JSON.
    pub fn format_json(summary: &RunSummary) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(summary)?)
    }
}

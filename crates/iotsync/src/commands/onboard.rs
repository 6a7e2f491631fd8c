//! Onboarding command handler: one request, streamed progress.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};

use iotsync_core::{
    OnboardingFile, OnboardingRequest, OnboardingResult, ProgressEvent, ProgressStreamController,
};

use crate::cli::{GlobalOpts, OnboardArgs, OutputFormat};
use crate::config::BackendContext;
use crate::error::CliError;
use crate::output;

fn read_pdf(path: &Path) -> Result<OnboardingFile, CliError> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map_or_else(|| "document.pdf".into(), |n| n.to_string_lossy().into_owned());
    Ok(OnboardingFile::pdf(name, bytes))
}

/// Device payload from `--data`, with `--name` layered on top.
fn device_data(args: &OnboardArgs) -> Result<Value, CliError> {
    let mut data = match args.data {
        Some(ref path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => json!({}),
    };
    let Value::Object(ref mut fields) = data else {
        return Err(CliError::Validation {
            field: "data".into(),
            reason: "device payload must be a JSON object".into(),
        });
    };
    if let Some(ref name) = args.name {
        fields.insert("name".into(), Value::String(name.clone()));
    }
    if !fields.contains_key("name") {
        return Err(CliError::Validation {
            field: "name".into(),
            reason: "pass --name or include \"name\" in --data".into(),
        });
    }
    Ok(data)
}

fn build_request(args: &OnboardArgs) -> Result<OnboardingRequest, CliError> {
    let mut request = OnboardingRequest::new(device_data(args)?);
    request.manual = args.manual.as_deref().map(read_pdf).transpose()?;
    request.datasheet = args.datasheet.as_deref().map(read_pdf).transpose()?;
    request.certificate = args.certificate.as_deref().map(read_pdf).transpose()?;
    Ok(request)
}

#[allow(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn percent(event: &ProgressEvent) -> u64 {
    // Already clamped to 0..=100 by the core.
    event.progress_percent.round() as u64
}

fn progress_line(event: &ProgressEvent) -> String {
    let mut line = format!("[{}] {}", event.stage, event.message);
    if let Some(ref step) = event.step_details {
        line.push_str(&format!(
            " (step {}/{}: {})",
            step.current_step, step.total_steps, step.step_name
        ));
    }
    line
}

fn detail(r: &OnboardingResult) -> String {
    let mut lines = vec![
        format!("Device ID:   {}", r.device_id),
        format!("Device name: {}", r.device_name),
    ];
    if let Some(ref pdf) = r.pdf {
        lines.push(format!(
            "Document:    {}",
            pdf.pdf_name
                .as_deref()
                .or(pdf.original_file_name.as_deref())
                .unwrap_or("-")
        ));
        lines.push(format!("Rules:       {}", pdf.rules_generated));
        lines.push(format!("Maintenance: {}", pdf.maintenance_items));
        lines.push(format!("Safety:      {}", pdf.safety_precautions));
    }
    lines.join("\n")
}

pub async fn handle(
    ctx: &BackendContext,
    args: OnboardArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let request = build_request(&args)?;
    let controller = ProgressStreamController::new(Arc::clone(&ctx.api), ctx.sync.onboarding);

    let interactive = !global.quiet && matches!(global.output, OutputFormat::Table);
    let bar = if interactive {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner} {bar:40} {pos:>3}% {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    } else {
        ProgressBar::hidden()
    };

    let result = controller
        .run(&request, |event: &ProgressEvent| {
            tracing::debug!(stage = %event.stage, percent = event.progress_percent, "progress");
            bar.set_position(percent(event));
            bar.set_message(progress_line(event));
        })
        .await;

    match result {
        Ok(result) => {
            bar.finish_and_clear();
            let out =
                output::render_single(&global.output, &result, detail, |r| r.device_id.clone())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        Err(err) => {
            bar.abandon();
            Err(err.into())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(name: Option<&str>, data: Option<&Path>) -> OnboardArgs {
        OnboardArgs {
            name: name.map(str::to_owned),
            data: data.map(Path::to_path_buf),
            manual: None,
            datasheet: None,
            certificate: None,
        }
    }

    #[test]
    fn name_flag_overrides_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(&path, r#"{"name":"Old","location":"Hall 2"}"#).unwrap();

        let data = device_data(&args(Some("Pump 7"), Some(&path))).unwrap();
        assert_eq!(data["name"], "Pump 7");
        assert_eq!(data["location"], "Hall 2");
    }

    #[test]
    fn payload_without_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(&path, r#"{"location":"Hall 2"}"#).unwrap();

        let err = device_data(&args(None, Some(&path))).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "name"));
    }
}

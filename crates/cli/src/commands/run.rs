//! `run` and `worker`: execute checks through the runner.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use foursight_core::{HandlerKind, Kwargs, RunOutcome, RunReport, Runner};

use crate::app::App;
use crate::commands::{print_json, report_json, report_line};
use crate::OutputFormat;

/// Parse `--kwargs`; it must be a JSON object.
pub(crate) fn parse_kwargs(raw: Option<&str>) -> Result<Kwargs, String> {
    let Some(raw) = raw else {
        return Ok(Kwargs::new());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("--kwargs must be a JSON object, got {other}")),
        Err(e) => Err(format!("could not parse --kwargs: {e}")),
    }
}

fn print_reports(reports: &[RunReport], output: OutputFormat) {
    match output {
        OutputFormat::Json => print_json(&Value::Array(reports.iter().map(report_json).collect())),
        OutputFormat::Text => {
            for report in reports {
                println!("{}", report_line(report));
            }
        }
    }
}

fn lost_count(reports: &[RunReport]) -> usize {
    reports
        .iter()
        .filter(|r| matches!(r.outcome, RunOutcome::Lost { .. }))
        .count()
}

/// Queue one check, then run it and any action it chains to completion.
pub(crate) async fn cmd_run(
    app: &App,
    name: &str,
    kwargs: Option<&str>,
    output: OutputFormat,
) -> Result<(), String> {
    app.registry
        .get_kind(name, HandlerKind::Check)
        .map_err(|e| e.to_string())?;
    let kwargs = parse_kwargs(kwargs)?;

    let runner = app.runner();
    runner.scheduler().submit_check(name, kwargs).await;
    let reports = runner.drain().await.map_err(|e| e.to_string())?;
    print_reports(&reports, output);

    match lost_count(&reports) {
        0 => Ok(()),
        lost => Err(format!("{lost} result(s) could not be stored")),
    }
}

/// Names a worker submits on each schedule tick.
fn scheduled_checks(app: &App) -> Result<Vec<String>, String> {
    let configured = &app.config.worker.checks;
    if configured.is_empty() {
        return Ok(app
            .registry
            .registrations()
            .filter(|r| r.kind() == HandlerKind::Check)
            .map(|r| r.name.clone())
            .collect());
    }
    for name in configured {
        app.registry
            .get_kind(name, HandlerKind::Check)
            .map_err(|e| format!("[worker] checks: {e}"))?;
    }
    Ok(configured.clone())
}

async fn submit_scheduled(runner: &Runner, checks: &[String]) {
    for name in checks {
        runner.scheduler().submit_check(name, Kwargs::new()).await;
    }
}

/// Run the worker pool. With `once`, submit the scheduled checks a single
/// time, drain the queues and exit; otherwise resubmit them every schedule
/// interval until interrupted.
pub(crate) async fn cmd_worker(
    app: &App,
    workers: Option<usize>,
    once: bool,
    output: OutputFormat,
) -> Result<(), String> {
    let checks = scheduled_checks(app)?;
    let runner = Arc::new(app.runner());

    if once {
        submit_scheduled(&runner, &checks).await;
        let reports = runner.drain().await.map_err(|e| e.to_string())?;
        print_reports(&reports, output);
        return match lost_count(&reports) {
            0 => Ok(()),
            lost => Err(format!("{lost} result(s) could not be stored")),
        };
    }

    let workers = workers.unwrap_or(app.config.worker.workers).max(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = runner.spawn_workers(workers, shutdown_rx);
    tracing::info!(env = app.env(), workers, checks = checks.len(), "worker pool started");

    let mut schedule = tokio::time::interval(app.config.worker.schedule_interval());
    loop {
        tokio::select! {
            _ = schedule.tick() => submit_scheduled(&runner, &checks).await,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "could not listen for shutdown signal");
                }
                break;
            }
        }
    }

    tracing::info!("shutting down worker pool");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "worker task failed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kwargs_default_to_empty() {
        assert!(parse_kwargs(None).unwrap().is_empty());
    }

    #[test]
    fn kwargs_must_be_an_object() {
        let kwargs = parse_kwargs(Some(r#"{"primary": true}"#)).unwrap();
        assert_eq!(kwargs["primary"], Value::Bool(true));

        assert!(parse_kwargs(Some("[1, 2]"))
            .unwrap_err()
            .contains("must be a JSON object"));
        assert!(parse_kwargs(Some("{oops"))
            .unwrap_err()
            .contains("could not parse"));
    }
}

//! Table builder wrapper around comfy-table for consistent list display.

use chrono::{DateTime, Utc};
use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use console::style;

use crate::domain::models::{JobRecord, JobStatus, WorkerRecord};
use crate::services::WorkerProbe;

use super::output::truncate;

/// Create a standard list table with the given headers.
///
/// Uses the NOTHING preset (no borders) for a clean CLI aesthetic.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

/// Render the table to string with a count header.
pub fn render_list(entity_name: &str, table: Table, total: usize) -> String {
    if total == 0 {
        return format!("No {entity_name}s found.");
    }
    let count_line = format!(
        "{} {}:",
        style(total).bold(),
        if total == 1 {
            entity_name.to_string()
        } else {
            format!("{entity_name}s")
        }
    );
    format!("{count_line}\n{table}")
}

fn when(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), |t| t.format("%H:%M:%S").to_string())
}

/// Fleet status listing.
pub fn workers_table(workers: &[WorkerRecord]) -> String {
    let mut table = list_table(&["id", "endpoint", "enabled", "last seen", "restarts", "health", "jobs"]);
    for worker in workers {
        let health = if !worker.enabled {
            style("disabled").dim().to_string()
        } else if worker.critical {
            style("critical").red().bold().to_string()
        } else if worker.last_error.is_some() {
            style("degraded").yellow().to_string()
        } else {
            style("ok").green().to_string()
        };
        table.add_row(vec![
            worker.id.clone(),
            worker.endpoint.clone(),
            worker.enabled.to_string(),
            when(worker.last_seen),
            worker.restart_count.to_string(),
            health,
            worker.assigned_jobs.len().to_string(),
        ]);
    }
    render_list("worker", table, workers.len())
}

/// Live worker probe listing.
pub fn probes_table(probes: &[WorkerProbe]) -> String {
    let mut table = list_table(&["id", "endpoint", "running", "success", "requests", "error"]);
    for probe in probes {
        let (running, success, requests) = match probe.status {
            Some(status) => (
                status.running.to_string(),
                status.success.to_string(),
                status.requests.to_string(),
            ),
            None if !probe.enabled => ("disabled".to_string(), "-".to_string(), "-".to_string()),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        let error = probe
            .error
            .as_deref()
            .map_or_else(String::new, |e| style(truncate(e, 48)).red().to_string());
        table.add_row(vec![
            probe.worker_id.clone(),
            probe.endpoint.clone(),
            running,
            success,
            requests,
            error,
        ]);
    }
    render_list("worker", table, probes.len())
}

/// Job listing.
pub fn jobs_table(jobs: &[JobRecord]) -> String {
    let mut table = list_table(&["job", "resource", "status", "progress", "goal", "restarts", "workers"]);
    for job in jobs {
        let status = match job.status {
            JobStatus::Running if job.degraded => style("RUNNING (degraded)").yellow().to_string(),
            JobStatus::Running => style(job.status.as_str()).cyan().to_string(),
            JobStatus::Completed => style(job.status.as_str()).green().to_string(),
            JobStatus::Stopped => style(job.status.as_str()).dim().to_string(),
            JobStatus::RestartExhausted => style(job.status.as_str()).red().to_string(),
        };
        table.add_row(vec![
            job.job_id.clone(),
            job.resource_id.clone(),
            status,
            format!("{} ({:.1}%)", job.progress(), job.progress_percent()),
            job.goal_value.to_string(),
            job.restart_attempts.to_string(),
            job.assigned_workers.len().to_string(),
        ]);
    }
    render_list("job", table, jobs.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::WorkerDescriptor;

    #[test]
    fn test_render_empty_list() {
        let table = list_table(&["id"]);
        assert_eq!(render_list("job", table, 0), "No jobs found.");
    }

    #[test]
    fn test_workers_table_lists_ids() {
        let workers = vec![
            WorkerRecord::new(&WorkerDescriptor::new("w1", "http://w1")),
            WorkerRecord::new(&WorkerDescriptor::new("w2", "http://w2").disabled()),
        ];
        let rendered = workers_table(&workers);
        assert!(rendered.contains("w1"));
        assert!(rendered.contains("http://w2"));
        assert!(rendered.contains("disabled"));
    }
}

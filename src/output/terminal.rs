// Colored terminal output for cluster reports and job runs.
//
// All terminal-specific formatting lives here; main.rs delegates to it.

use colored::Colorize;

use crate::db::models::{JobRun, JobState, StoredCluster, Topic};
use crate::jobs::{JobStatus, JobTicket};
use crate::reasoning;

/// Display a topic's stored clusters, largest first.
pub fn display_clusters(topic: &Topic, clusters: &[StoredCluster], explain: bool) {
    if clusters.is_empty() {
        println!(
            "No clusters for topic {} yet. Run `quorum cluster {}` first.",
            topic.id, topic.id
        );
        return;
    }

    let total: usize = clusters.iter().map(|c| c.members.len()).sum();
    println!(
        "\n{}",
        format!(
            "=== {} ({} opinions, {} clusters) ===",
            topic.title,
            total,
            clusters.len()
        )
        .bold()
    );

    for cluster in clusters {
        println!();
        println!(
            "  {} {}  {}",
            format!("#{}", cluster.position + 1).cyan().bold(),
            super::truncate_chars(&cluster.heading, 100).bold(),
            format!("({} members)", cluster.members.len()).dimmed()
        );

        for member in &cluster.members {
            let marker = if member.id == cluster.leader_id {
                "*".green().bold()
            } else {
                "-".dimmed()
            };
            println!(
                "    {} [{:>2}] {:<16} {}",
                marker,
                member.weight,
                super::truncate_chars(&member.author, 16),
                super::truncate_chars(&member.text, 100)
            );
        }

        if explain {
            let why = reasoning::explain(&cluster.members, &cluster.heading);
            println!("    {} {}", "why grouped:".yellow(), why.clustering_reason);
            println!("    {} {}", "why heading:".yellow(), why.heading_rationale);
        }
    }
    println!();
}

/// Display the outcome of a trigger.
pub fn display_ticket(ticket: &JobTicket) {
    if ticket.coalesced {
        println!(
            "Topic {} already has job {} queued; joined it.",
            ticket.topic_id, ticket.job_id
        );
    } else {
        println!("Queued job {} for topic {}.", ticket.job_id, ticket.topic_id);
    }
}

/// Display a job's final status.
pub fn display_job_status(status: &JobStatus) {
    let state = colorize_state(status.state);
    match (&status.error, status.cluster_count) {
        (Some(err), _) => println!("Job {}: {} ({})", status.job_id, state, err.red()),
        (None, Some(count)) => println!("Job {}: {} ({} clusters)", status.job_id, state, count),
        (None, None) => println!("Job {}: {}", status.job_id, state),
    }
}

/// Display recent job runs, newest first.
pub fn display_job_runs(runs: &[JobRun]) {
    if runs.is_empty() {
        println!("Job runs: none yet");
        return;
    }

    println!("Recent job runs:");
    for run in runs {
        let detail = match (&run.error, run.cluster_count) {
            (Some(err), _) => super::truncate_chars(err, 80).red().to_string(),
            (None, Some(count)) => format!("{count} clusters"),
            (None, None) => String::new(),
        };
        println!(
            "  job {:<5} topic {:<5} {:<8} {}  {}",
            run.job_id,
            run.topic_id,
            colorize_state(run.state),
            run.finished_at.as_deref().unwrap_or(&run.started_at).dimmed(),
            detail
        );
    }
}

fn colorize_state(state: JobState) -> colored::ColoredString {
    match state {
        JobState::Done => state.as_str().green(),
        JobState::Failed => state.as_str().red().bold(),
        JobState::Running => state.as_str().yellow(),
        JobState::Queued => state.as_str().dimmed(),
    }
}

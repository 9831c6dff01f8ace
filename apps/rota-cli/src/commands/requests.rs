// requests.rs — Review shift change requests: list, show, preview, approve, reject.

use clap::Subcommand;
use rota_approval::{RequestPreview, ShiftChangeRequest};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::adjust::print_preview;
use super::{truncate, Daemon};

#[derive(Subcommand)]
pub enum RequestCommands {
    /// List requests, newest first.
    List {
        /// Filter by status (pending, approved, rejected).
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one request.
    Show { id: Uuid },
    /// Preview a pending request with fill-in suggestions.
    Preview { id: Uuid },
    /// Approve and commit a pending request.
    Approve {
        id: Uuid,
        /// Reviewer name recorded on the request.
        #[arg(long)]
        by: Option<String>,
    },
    /// Reject a pending request.
    Reject {
        id: Uuid,
        #[arg(long)]
        by: Option<String>,
        /// Replaces the requester's stated reason.
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Deserialize, Serialize)]
struct RequestList {
    requests: Vec<ShiftChangeRequest>,
    total: usize,
}

pub async fn execute(daemon: &Daemon, command: RequestCommands) -> anyhow::Result<()> {
    match command {
        RequestCommands::List { status } => list(daemon, status.as_deref()).await,
        RequestCommands::Show { id } => {
            let request: ShiftChangeRequest = daemon.get(&format!("/api/shift-change/{}", id)).await?;
            if !daemon.print_raw(&request)? {
                print_request(&request);
            }
            Ok(())
        }
        RequestCommands::Preview { id } => preview(daemon, id).await,
        RequestCommands::Approve { id, by } => {
            let request: ShiftChangeRequest = daemon
                .post(
                    &format!("/api/shift-change/{}/approve", id),
                    &json!({ "decided_by": by }),
                )
                .await?;
            println!("Request {} approved.", request.id);
            if let Some(cs) = request.change_set_id {
                println!("  Change set: {}", cs);
            }
            Ok(())
        }
        RequestCommands::Reject { id, by, reason } => {
            let request: ShiftChangeRequest = daemon
                .post(
                    &format!("/api/shift-change/{}/reject", id),
                    &json!({ "decided_by": by, "reason": reason }),
                )
                .await?;
            println!("Request {} rejected.", request.id);
            Ok(())
        }
    }
}

async fn list(daemon: &Daemon, status: Option<&str>) -> anyhow::Result<()> {
    let path = match status {
        Some(status) => format!("/api/shift-change?status={}", status),
        None => "/api/shift-change".to_string(),
    };
    let list: RequestList = daemon.get(&path).await?;
    if daemon.print_raw(&list)? {
        return Ok(());
    }
    if list.requests.is_empty() {
        println!("No requests found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<14} {:<18} {:<12} {:<10}",
        "ID", "TYPE", "EMPLOYEE", "DATE", "STATUS"
    );
    println!("{}", "-".repeat(94));
    for r in &list.requests {
        let who = r
            .employee_name
            .clone()
            .unwrap_or_else(|| r.employee_id.to_string());
        println!(
            "{:<38} {:<14} {:<18} {:<12} {:<10}",
            r.id,
            r.kind.to_string(),
            truncate(&who, 16),
            r.date,
            r.status.to_string(),
        );
    }
    println!("\n{} request(s) total.", list.total);
    Ok(())
}

fn print_request(r: &ShiftChangeRequest) {
    println!("Request:  {}", r.id);
    println!("Type:     {}", r.kind);
    println!(
        "Employee: {} ({})",
        r.employee_name.as_deref().unwrap_or("-"),
        r.employee_id
    );
    println!("Date:     {}", r.date);
    if let Some(slot) = r.from_slot {
        println!("From:     {}", slot);
    }
    if let Some(slot) = r.to_slot {
        println!("To:       {}", slot);
    }
    if let Some(target) = r.target_employee_id {
        println!(
            "Target:   {} ({})",
            r.target_employee_name.as_deref().unwrap_or("-"),
            target
        );
    }
    if let Some(ref reason) = r.reason {
        println!("Reason:   {}", reason);
    }
    println!("Status:   {}", r.status);
    if let Some(ref via) = r.requested_via {
        println!("Via:      {}", via);
    }
    println!(
        "Week:     {}..{} (version {} at intake)",
        r.snapshot_week_start, r.snapshot_week_end, r.snapshot_version
    );
    if let Some(ref by) = r.decided_by {
        println!("Decided:  {}", by);
    }
    println!("Created:  {}", r.created_at.to_rfc3339());
    println!("Updated:  {}", r.updated_at.to_rfc3339());
}

async fn preview(daemon: &Daemon, id: Uuid) -> anyhow::Result<()> {
    let preview: RequestPreview = daemon
        .get(&format!("/api/shift-change/{}/preview", id))
        .await?;
    if daemon.print_raw(&preview)? {
        return Ok(());
    }
    print_request(&preview.request);
    println!();
    print_preview(&preview.preview);

    if !preview.suggestions.is_empty() {
        println!();
        println!("Fill-in suggestions:");
        for s in &preview.suggestions {
            let names: Vec<String> = s
                .candidates
                .iter()
                .map(|c| format!("#{} {} ({})", c.rank, c.name, c.employee_id))
                .collect();
            let more = s.ranked.len().saturating_sub(s.candidates.len());
            println!(
                "  {} {} (was {}): {}{}",
                s.date,
                s.time_slot,
                s.original_employee_id,
                if names.is_empty() {
                    "nobody available".to_string()
                } else {
                    names.join(", ")
                },
                if more > 0 {
                    format!(" +{} more", more)
                } else {
                    String::new()
                }
            );
        }
    }
    Ok(())
}

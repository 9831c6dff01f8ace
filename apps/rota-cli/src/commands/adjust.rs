// adjust.rs — Preview, apply, rollback and discard change-sets.

use anyhow::{anyhow, bail};
use rota_changeset::{AdjustmentRule, ApplyReceipt, ChangeSetRecord, ParseResponse, Preview, RollbackReceipt};
use serde_json::{json, Value};
use uuid::Uuid;

use super::schedule::print_shifts;
use super::Daemon;

pub async fn preview(daemon: &Daemon, rule: Option<&str>, text: Option<&str>) -> anyhow::Result<()> {
    let rule: AdjustmentRule = match (rule, text) {
        (Some(json), _) => serde_json::from_str(json)?,
        (None, Some(text)) => {
            let parsed: ParseResponse = daemon
                .post("/api/adjustments/parse", &json!({ "free_text": text }))
                .await?;
            if parsed.needs_disambiguation {
                println!("The instruction is ambiguous. Please choose:");
                for (field, options) in &parsed.choices {
                    println!("  {}: {}", field, options.join(" | "));
                }
                return Ok(());
            }
            parsed
                .ready_rule()
                .cloned()
                .ok_or_else(|| anyhow!("the parser could not interpret: {}", text))?
        }
        (None, None) => bail!("give either --rule or --text"),
    };

    let preview: Preview = daemon
        .post("/api/adjustments/preview", &json!({ "rule": rule }))
        .await?;
    if daemon.print_raw(&preview)? {
        return Ok(());
    }
    print_preview(&preview);
    Ok(())
}

pub fn print_preview(preview: &Preview) {
    let cs = &preview.change_set;
    println!("Change set: {}", cs.id);
    println!("Rule:       {}", cs.rule.action());
    println!("Week:       {}..{}", preview.week_start, preview.week_end);
    println!("Version:    {}", cs.schedule_version);
    println!("Deltas:     {}", cs.score);
    println!();
    for s in &preview.added {
        println!("  + {} emp {} {}", s.date, s.employee_id, s.start_time.format("%H:%M"));
    }
    for s in &preview.removed {
        println!("  - {} emp {} {}", s.date, s.employee_id, s.start_time.format("%H:%M"));
    }
    for u in &preview.updated {
        println!(
            "  ~ {} emp {} {} -> emp {} {}",
            u.before.date,
            u.before.employee_id,
            u.before.start_time.format("%H:%M"),
            u.after.employee_id,
            u.after.start_time.format("%H:%M"),
        );
    }
    if cs.deltas.is_empty() {
        println!("  (no changes)");
    }
    println!();
    println!("Week after the change:");
    print_shifts(&preview.shifts);
}

pub async fn apply(daemon: &Daemon, change_set_id: Uuid) -> anyhow::Result<()> {
    let receipt: ApplyReceipt = daemon
        .post("/api/adjustments/apply", &json!({ "change_set_id": change_set_id }))
        .await?;
    if !daemon.print_raw(&receipt)? {
        println!(
            "Applied {} (schedule version {}) at {}.",
            receipt.change_set_id,
            receipt.version_id,
            receipt.applied_at.to_rfc3339()
        );
    }
    Ok(())
}

pub async fn rollback(daemon: &Daemon, change_set_id: Uuid) -> anyhow::Result<()> {
    let receipt: RollbackReceipt = daemon
        .post("/api/adjustments/rollback", &json!({ "change_set_id": change_set_id }))
        .await?;
    if !daemon.print_raw(&receipt)? {
        println!(
            "Rolled back {} (schedule version {}).",
            receipt.change_set_id, receipt.version_id
        );
    }
    Ok(())
}

pub async fn discard(daemon: &Daemon, change_set_id: Uuid) -> anyhow::Result<()> {
    let _: Value = daemon
        .post("/api/adjustments/discard", &json!({ "change_set_id": change_set_id }))
        .await?;
    println!("Discarded {}.", change_set_id);
    Ok(())
}

pub async fn list(daemon: &Daemon, state: Option<&str>) -> anyhow::Result<()> {
    let path = match state {
        Some(state) => format!("/api/change-sets?state={}", state),
        None => "/api/change-sets".to_string(),
    };
    let records: Vec<ChangeSetRecord> = daemon.get(&path).await?;
    if daemon.print_raw(&records)? {
        return Ok(());
    }
    if records.is_empty() {
        println!("No change sets found.");
        return Ok(());
    }

    println!("{:<38} {:<16} {:<12} {:<8} {:<6}", "ID", "RULE", "STATE", "VERSION", "DELTAS");
    println!("{}", "-".repeat(84));
    for r in &records {
        println!(
            "{:<38} {:<16} {:<12} {:<8} {:<6}",
            r.change_set.id,
            r.change_set.rule.action(),
            r.state.to_string(),
            r.change_set.schedule_version,
            r.change_set.score,
        );
    }
    println!("\n{} change set(s).", records.len());
    Ok(())
}

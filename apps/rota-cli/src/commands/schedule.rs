// schedule.rs — Schedule inspection, roster management and baseline generation.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Subcommand;
use rota_changeset::{OptimizeRequest, Roster, ScheduleSnapshot, Shift};
use serde_json::{json, Value};

use super::Daemon;

#[derive(Subcommand)]
pub enum RosterCommands {
    /// List employees.
    Show,
    /// Replace the roster from a JSON file (a list of employees).
    Load { file: PathBuf },
}

pub async fn shifts(daemon: &Daemon, week_of: Option<NaiveDate>) -> anyhow::Result<()> {
    let path = match week_of {
        Some(date) => format!("/api/shifts?week_of={}", date),
        None => "/api/shifts".to_string(),
    };
    let snapshot: ScheduleSnapshot = daemon.get(&path).await?;
    if daemon.print_raw(&snapshot)? {
        return Ok(());
    }

    println!("Schedule version {}", snapshot.schedule_version);
    print_shifts(&snapshot.shifts);
    println!("\n{} shift(s).", snapshot.shifts.len());
    Ok(())
}

pub fn print_shifts(shifts: &[Shift]) {
    println!("{:<8} {:<12} {:<10} {:<7} {:<7}", "ID", "DATE", "EMPLOYEE", "START", "END");
    println!("{}", "-".repeat(48));
    let mut sorted: Vec<&Shift> = shifts.iter().collect();
    sorted.sort_by_key(|s| (s.date, s.start_time, s.employee_id));
    for s in sorted {
        println!(
            "{:<8} {:<12} {:<10} {:<7} {:<7}",
            s.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
            s.date,
            s.employee_id,
            s.start_time.format("%H:%M"),
            s.end_time.format("%H:%M"),
        );
    }
}

pub async fn roster(daemon: &Daemon, command: RosterCommands) -> anyhow::Result<()> {
    match command {
        RosterCommands::Show => {
            let roster: Roster = daemon.get("/api/roster").await?;
            if daemon.print_raw(&roster)? {
                return Ok(());
            }
            println!("{:<8} {:<24} {:<12} {:<5}", "ID", "NAME", "ROLE", "SKILL");
            println!("{}", "-".repeat(52));
            for e in roster.employees() {
                println!(
                    "{:<8} {:<24} {:<12} {:<5}",
                    e.id,
                    super::truncate(&e.name, 22),
                    e.role,
                    e.skill_level
                );
            }
            println!("\n{} employee(s).", roster.len());
        }
        RosterCommands::Load { file } => {
            let content = std::fs::read_to_string(&file)?;
            let roster: Roster = serde_json::from_str(&content)?;
            let reply: Value = daemon.put("/api/roster", &roster).await?;
            println!("Roster replaced: {} employee(s).", reply["employees"]);
        }
    }
    Ok(())
}

pub async fn generate(
    daemon: &Daemon,
    week_start: NaiveDate,
    week_end: NaiveDate,
) -> anyhow::Result<()> {
    let request = OptimizeRequest {
        week_start,
        week_end,
        employee_ids: Vec::new(),
        constraints: json!({}),
    };
    let reply: Value = daemon.post("/api/shifts/generate", &request).await?;
    if daemon.print_raw(&reply)? {
        return Ok(());
    }
    println!(
        "Baseline for {}..{} loaded as version {}.",
        week_start, week_end, reply["schedule_version"]
    );
    Ok(())
}

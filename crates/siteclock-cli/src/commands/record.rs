use chrono::Utc;
use clap::Subcommand;
use siteclock_core::{AttendanceMachine, AttendanceState, Database};

#[derive(Subcommand)]
pub enum RecordAction {
    /// Most recent attendance records, newest first
    List {
        employee: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        json: bool,
    },
    /// Current clock-in status
    Status {
        employee: String,
        #[arg(long)]
        json: bool,
    },
    /// Manual clock-in override; closes any open record first
    ClockIn { employee: String, site: String },
    /// Manual clock-out
    ClockOut { employee: String },
}

pub fn run(action: RecordAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        RecordAction::List {
            employee,
            limit,
            json,
        } => {
            let records = db.records(&employee, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("no records for '{employee}'");
            } else {
                for record in &records {
                    let out = record
                        .clock_out
                        .map_or("open".into(), |t| t.to_rfc3339());
                    println!(
                        "{}  {}  {} -> {out}",
                        record.id,
                        record.site_id,
                        record.clock_in.to_rfc3339()
                    );
                }
            }
        }
        RecordAction::Status { employee, json } => {
            let machine = AttendanceMachine::resume(employee, &db)?;
            if json {
                let snapshot = machine.snapshot(Utc::now());
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                match machine.state() {
                    AttendanceState::Out => println!("clocked out"),
                    AttendanceState::In { site_id, since, .. } => {
                        println!("clocked in at '{site_id}' since {}", since.to_rfc3339());
                    }
                }
            }
        }
        RecordAction::ClockIn { employee, site } => {
            if !db.list_sites()?.iter().any(|s| s.id == site) {
                return Err(format!("unknown site '{site}'").into());
            }
            let mut machine = AttendanceMachine::resume(employee.clone(), &db)?;
            let events = machine.manual_clock_in(&db, &site, None, Utc::now())?;
            if events.is_empty() {
                println!("'{employee}' already clocked in at '{site}'");
            } else {
                println!("'{employee}' clocked in at '{site}'");
            }
        }
        RecordAction::ClockOut { employee } => {
            let mut machine = AttendanceMachine::resume(employee.clone(), &db)?;
            match machine.manual_clock_out(&db, Utc::now())? {
                Some(_) => println!("'{employee}' clocked out"),
                None => println!("'{employee}' is not clocked in"),
            }
        }
    }
    Ok(())
}

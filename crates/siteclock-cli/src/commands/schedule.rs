use chrono::Weekday;
use clap::Subcommand;
use siteclock_core::schedule::{parse_hhmm, weekday_from_index, DayWindow, TrackingSchedule};
use siteclock_core::storage::AttendanceStore;
use siteclock_core::{Config, Database};

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Set the weekly tracking window for an employee
    Set {
        employee: String,
        /// Comma-separated days ("mon,tue,fri"), or "weekdays" / "all"
        #[arg(long, default_value = "weekdays")]
        days: String,
        /// Window start, "HH:MM"
        #[arg(long, default_value = "09:00")]
        start: String,
        /// Window end, "HH:MM" (exclusive)
        #[arg(long, default_value = "17:00")]
        end: String,
    },
    /// Show the stored schedule, or the configured default if none is stored
    Show {
        employee: String,
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: ScheduleAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        ScheduleAction::Set {
            employee,
            days,
            start,
            end,
        } => {
            let start = parse_hhmm(&start)?;
            let end = parse_hhmm(&end)?;
            let mut schedule = TrackingSchedule::all_disabled();
            for day in parse_days(&days)? {
                schedule.set_window(day, DayWindow::enabled(start, end));
            }
            schedule.validate()?;
            db.set_schedule(&employee, &schedule)?;
            println!("schedule for '{employee}' saved");
        }
        ScheduleAction::Show { employee, json } => {
            let stored = db.tracking_schedule(&employee)?;
            let from_default = stored.is_none();
            let schedule = match stored {
                Some(schedule) => schedule,
                None => Config::load_or_default().default_schedule.to_schedule()?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&schedule)?);
            } else {
                if from_default {
                    println!("(no stored schedule, showing configured default)");
                }
                for i in 0..7u8 {
                    let day = weekday_from_index(i)?;
                    let window = schedule.window_for(day);
                    if window.enabled {
                        println!(
                            "{day}  {} - {}",
                            window.start.format("%H:%M"),
                            window.end.format("%H:%M")
                        );
                    } else {
                        println!("{day}  off");
                    }
                }
            }
        }
    }
    Ok(())
}

fn parse_days(spec: &str) -> Result<Vec<Weekday>, Box<dyn std::error::Error>> {
    match spec {
        "all" => Ok(vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]),
        "weekdays" => Ok(vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ]),
        _ => spec.split(',').map(parse_day).collect(),
    }
}

fn parse_day(token: &str) -> Result<Weekday, Box<dyn std::error::Error>> {
    let day = match token.trim().to_ascii_lowercase().as_str() {
        "mon" | "monday" => Weekday::Mon,
        "tue" | "tuesday" => Weekday::Tue,
        "wed" | "wednesday" => Weekday::Wed,
        "thu" | "thursday" => Weekday::Thu,
        "fri" | "friday" => Weekday::Fri,
        "sat" | "saturday" => Weekday::Sat,
        "sun" | "sunday" => Weekday::Sun,
        other => return Err(format!("unknown day '{other}'").into()),
    };
    Ok(day)
}

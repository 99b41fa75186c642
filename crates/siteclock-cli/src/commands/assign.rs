use chrono::NaiveDate;
use clap::Subcommand;
use siteclock_core::{Assignment, Database};

#[derive(Subcommand)]
pub enum AssignAction {
    /// Assign an employee to a site
    Add {
        employee: String,
        site: String,
        /// First day the assignment applies (YYYY-MM-DD, inclusive)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last day the assignment applies (YYYY-MM-DD, inclusive)
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Remove an assignment
    Remove { employee: String, site: String },
    /// List an employee's assignments
    List {
        employee: String,
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: AssignAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        AssignAction::Add {
            employee,
            site,
            start,
            end,
        } => {
            db.add_assignment(&Assignment {
                employee_id: employee.clone(),
                site_id: site.clone(),
                start_date: start,
                end_date: end,
            })?;
            println!("assigned '{employee}' to '{site}'");
        }
        AssignAction::Remove { employee, site } => {
            db.remove_assignment(&employee, &site)?;
            println!("removed assignment '{employee}' -> '{site}'");
        }
        AssignAction::List { employee, json } => {
            let assignments = db.assignments(&employee)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&assignments)?);
            } else if assignments.is_empty() {
                println!("no assignments for '{employee}'");
            } else {
                for a in &assignments {
                    let start = a.start_date.map_or("..".into(), |d| d.to_string());
                    let end = a.end_date.map_or("..".into(), |d| d.to_string());
                    println!("{}  {start} - {end}", a.site_id);
                }
            }
        }
    }
    Ok(())
}

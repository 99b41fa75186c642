use clap::Subcommand;
use siteclock_core::{Coordinate, Database, Site};

#[derive(Subcommand)]
pub enum SiteAction {
    /// Add or update a site geofence
    Add {
        /// Display name
        name: String,
        /// Center latitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Center longitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Geofence radius in meters
        #[arg(long, default_value_t = 100.0)]
        radius: f64,
        #[arg(long, default_value = "")]
        address: String,
        /// Explicit id; a random one is generated when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// List all sites
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove a site and every assignment pointing at it
    Remove { id: String },
}

pub fn run(action: SiteAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        SiteAction::Add {
            name,
            lat,
            lon,
            radius,
            address,
            id,
        } => {
            let site = Site {
                id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                name,
                address,
                center: Coordinate::new(lat, lon),
                radius_m: radius,
            };
            db.upsert_site(&site)?;
            println!("site '{}' saved ({})", site.name, site.id);
        }
        SiteAction::List { json } => {
            let sites = db.list_sites()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sites)?);
            } else if sites.is_empty() {
                println!("no sites");
            } else {
                for site in &sites {
                    println!(
                        "{}  {}  {:.5},{:.5}  r={}m",
                        site.id,
                        site.name,
                        site.center.latitude,
                        site.center.longitude,
                        site.radius_m
                    );
                }
            }
        }
        SiteAction::Remove { id } => {
            db.remove_site(&id)?;
            println!("site '{id}' removed");
        }
    }
    Ok(())
}

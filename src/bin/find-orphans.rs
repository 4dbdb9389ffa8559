use std::error::Error;

use dotenv::dotenv;
use log::{debug, info, initialize_logger, warn};
use structopt::StructOpt;
use time::{Duration, OffsetDateTime};

use portal::config::Settings;
use portal::environment;
use portal::orphans::find_orphans;
use portal::store::Store;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "find-orphans",
    about = "List stored blobs that no candidate refers to"
)]
struct Opt {
    /// Delete the orphaned blobs instead of only listing them
    #[structopt(long)]
    delete: bool,

    /// Ignore blobs uploaded less than this many minutes ago, since
    /// their requests may still be running
    #[structopt(long, default_value = "60")]
    min_age: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let opt = Opt::from_args();

    let logger = initialize_logger();
    let settings = Settings::from_env()?;

    let (db, store) = environment::connect(&logger, &settings).await?;

    let cutoff = OffsetDateTime::now_utc() - Duration::minutes(i64::from(opt.min_age));

    info!(logger, "Looking for orphaned blobs..."; "uploaded_before" => %cutoff);
    let orphans = find_orphans(db.as_ref(), store.as_ref(), cutoff).await?;

    info!(logger, "Found {} orphaned blobs", orphans.len());

    for id in &orphans {
        println!("{}", id);

        if opt.delete {
            debug!(logger, "Deleting blob..."; "blob_id" => %id);

            if let Err(e) = store.delete(id).await {
                warn!(logger, "Failed to delete blob"; "blob_id" => %id, "error" => %e);
            }
        }
    }

    Ok(())
}

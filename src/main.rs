use dotenv::dotenv;
use midmarks::{
    Credentials, ExamPeriod, Portal, PortalConfig, Source, SubjectRecord,
    config::{CliEnv, LoadFromEnv},
    effective_mark, lookup_marks,
    store::{JsonFileStore, MarksCache},
};

extern crate env_logger;
extern crate log;

use log::LevelFilter;

use log::{error, info};

fn print_marks(records: &[SubjectRecord], exam_period: ExamPeriod) -> anyhow::Result<()> {
    for record in records {
        let mark = effective_mark(record, exam_period);
        let flag = if mark.is_final { " (final)" } else { "" };
        println!(
            "{:<12} {:<45} {}{}",
            record.subject_code, record.subject_name, mark.value, flag
        );
    }
    println!("{}", serde_json::to_string_pretty(records)?);
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let portal_config = PortalConfig::new()?;
    let cli_env = CliEnv::load_from_env()?;
    let semester = cli_env.semester()?;
    let exam_period = cli_env.exam_period()?;
    let cache = cli_env
        .cache_file
        .clone()
        .map(|path| MarksCache::new(JsonFileStore::new(path)));

    let portal = Portal::new(&portal_config)?;
    let credentials = Credentials::new(cli_env.username.clone(), cli_env.password.clone());
    let lookup = lookup_marks(
        &portal,
        &credentials,
        cache.as_ref(),
        semester,
        exam_period,
        cli_env.refresh,
    )
    .await?;

    match lookup.source {
        Source::Portal => info!("marks fetched from {}", portal_config.base_url),
        Source::Cache(at) => info!("marks cached at {}, set PORTAL_REFRESH=true to refetch", at),
        Source::StaleCache(at) => info!("portal unavailable, marks cached at {}", at),
    }

    print_marks(&lookup.records, exam_period)
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

use crate::error::{Error, Result};
use crate::model::spec::ensure_unique_destinations;
use crate::model::downloader::FetchStage;
use crate::model::{ArtifactFetcher, ArtifactSpec, FetchFailure, FetchedBundle, RegistryClient};
use tokio::task::JoinSet;

pub type FetchOutcome = std::result::Result<FetchedBundle, FetchFailure>;

#[derive(Debug, Default)]
pub struct BatchReport {
    /// One outcome per spec, in input order.
    pub outcomes: Vec<FetchOutcome>,
}

impl BatchReport {
    pub fn successes(&self) -> impl Iterator<Item = &FetchedBundle> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &FetchFailure> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_ok())
    }
}

/// Fetches every spec, isolating failures so one bad artifact does not
/// stop the rest.
pub async fn run_batch<C>(
    fetcher: &ArtifactFetcher<C>,
    specs: Vec<ArtifactSpec>,
    parallel: bool,
) -> Result<BatchReport>
where
    C: RegistryClient + 'static,
{
    ensure_unique_destinations(&specs)?;

    if !parallel {
        let outcomes = specs
            .iter()
            .map(|spec| log_outcome(fetcher.fetch_and_persist(spec)))
            .collect();
        return Ok(BatchReport { outcomes });
    }

    tracing::info!("Fetching {} artifacts in parallel", specs.len());

    let mut tasks = JoinSet::new();
    for (index, spec) in specs.iter().cloned().enumerate() {
        let fetcher = fetcher.clone();
        tasks.spawn_blocking(move || (index, fetcher.fetch_and_persist(&spec)));
    }

    let mut slots: Vec<Option<FetchOutcome>> = specs.iter().map(|_| None).collect();
    let mut crashes: Vec<String> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(log_outcome(outcome)),
            Err(e) => crashes.push(e.to_string()),
        }
    }

    // A crashed task never reports its index; it owns whichever slot is
    // still empty. With several crashes the messages cannot be matched to
    // their specs.
    let reason = match crashes.as_slice() {
        [only] => only.clone(),
        _ => "fetch task panicked".to_string(),
    };
    let outcomes = slots
        .into_iter()
        .zip(specs)
        .map(|(slot, spec)| {
            slot.unwrap_or_else(|| {
                log_outcome(Err(FetchFailure {
                    spec,
                    stage: FetchStage::Unresolved,
                    error: Error::TaskFailed(reason.clone()),
                }))
            })
        })
        .collect();

    Ok(BatchReport { outcomes })
}

fn log_outcome(outcome: FetchOutcome) -> FetchOutcome {
    match &outcome {
        Ok(bundle) => tracing::info!(
            "Fetched {} into {:?} ({} files)",
            bundle.identifier,
            bundle.destination,
            bundle.files.len()
        ),
        Err(failure) => tracing::warn!("{}", failure),
    }
    outcome
}

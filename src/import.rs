use std::sync::atomic::Ordering;

use steppe::Progress;
use tracing::{error, info};

use crate::{Error, Result, backend::Backend, feature::Feature};

steppe::make_enum_progress! {
    pub enum ImportSteps {
        WriteRecords,
        WriteLocations,
    }
}

steppe::make_atomic_progress!(FeatureStep alias AtomicFeatureStep => "feature");

/// What happened to each write of an import. Failed writes are logged and skipped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub records_written: usize,
    pub records_failed: usize,
    pub locations_written: usize,
    pub locations_failed: usize,
    /// Features without a `BLOCKSWEEP`, nothing was written for them.
    pub missing_key: usize,
}

/// Write the serialized record of every feature, then register every point of
/// their geometry in the geospatial index.
///
/// The writes are independent: a failing one is logged and doesn't roll back or
/// prevent the others. A feature is visible to area queries as soon as one of
/// its points is written, whether its record made it or not.
pub fn import_all<B: Backend + ?Sized>(
    backend: &B,
    features: &[Feature],
    cancel: &(impl Fn() -> bool + Send + Sync),
    progress: &impl Progress,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    progress.update(ImportSteps::WriteRecords);
    let (atomic, step) = AtomicFeatureStep::new(features.len() as u64);
    progress.update(step);
    for feature in features {
        if cancel() {
            return Err(Error::ImportCanceled);
        }
        atomic.fetch_add(1, Ordering::Relaxed);
        let key = match feature.key() {
            Ok(key) => key,
            Err(err) => {
                error!("Skipping feature: {err}");
                report.missing_key += 1;
                continue;
            }
        };
        match feature
            .serialize()
            .and_then(|json| backend.set_value(key, &json))
        {
            Ok(()) => report.records_written += 1,
            Err(err) => {
                error!(%key, "There was an error saving the record: {err}");
                report.records_failed += 1;
            }
        }
    }

    progress.update(ImportSteps::WriteLocations);
    let (atomic, step) = AtomicFeatureStep::new(features.len() as u64);
    progress.update(step);
    for feature in features {
        if cancel() {
            return Err(Error::ImportCanceled);
        }
        atomic.fetch_add(1, Ordering::Relaxed);
        let Ok(key) = feature.key() else {
            continue;
        };
        for location in feature.locations() {
            match backend.set_location(key, location) {
                Ok(()) => report.locations_written += 1,
                Err(err) => {
                    error!(%key, "There was an error saving the location: {err}");
                    report.locations_failed += 1;
                }
            }
        }
    }

    info!(
        records = report.records_written,
        locations = report.locations_written,
        failures = report.records_failed + report.locations_failed,
        "import done"
    );
    Ok(report)
}

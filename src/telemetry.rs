use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt};

use crate::Result;
use crate::error::Error;

const DEFAULT_FILTER: &str = "info";

/// Initialise tracing avec un filtre optionnel et un mode JSON conditionnel.
///
/// Le filtre retenu est le premier valide parmi `explicit_filter`,
/// `RUST_LOG` puis `info`.
///
/// # Errors
///
/// Retourne une erreur si aucun filtre n'est valide, si la couche JSON est
/// demandée alors que la fonctionnalité n'est pas compilée, ou si
/// l'installation du subscriber global échoue.
pub fn init_tracing(explicit_filter: Option<&str>, use_json: bool) -> Result<()> {
    let filter = explicit_filter
        .map(str::to_string)
        .into_iter()
        .chain(std::env::var("RUST_LOG").ok())
        .chain(std::iter::once(DEFAULT_FILTER.to_string()))
        .find_map(|candidate| EnvFilter::try_new(candidate).ok())
        .ok_or_else(|| Error::Telemetry("invalid log filter".to_string()))?;

    #[cfg(feature = "json-logs")]
    if use_json {
        let subscriber = Registry::default().with(filter).with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .json()
                .flatten_event(true)
                .with_current_span(true),
        );
        return tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| Error::Telemetry(err.to_string()));
    }

    #[cfg(not(feature = "json-logs"))]
    if use_json {
        return Err(Error::Telemetry(
            "binary was built without the `json-logs` feature".to_string(),
        ));
    }

    let subscriber = Registry::default().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr),
    );
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| Error::Telemetry(err.to_string()))
}

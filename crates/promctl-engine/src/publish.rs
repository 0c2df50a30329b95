//! Outbound data this unit publishes to its own consumers once ready.

use std::collections::BTreeMap;

use serde::Serialize;

use promctl_core::Relation;
use promctl_core::config::UnitConfig;

/// A data bag to publish on one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publication {
    pub relation: Relation,
    pub fields: BTreeMap<String, String>,
}

/// `{schema}://{address}:{port}{path}`, with `path` normalized to start
/// with `/`. An empty path stays empty.
pub fn endpoint_url(schema: &str, address: &str, port: u16, path: &str) -> String {
    let path = if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    format!("{schema}://{address}:{port}{path}")
}

/// Everything published to consumers of this server.
pub fn publications(unit: &UnitConfig, port: u16) -> Vec<Publication> {
    let receive = Publication {
        relation: Relation::ReceiveRemoteWrite,
        fields: BTreeMap::from([(
            "remote_write".to_string(),
            endpoint_url(
                &unit.remote_write_schema,
                &unit.advertise_address,
                port,
                &unit.remote_write_path,
            ),
        )]),
    };

    let datasource = Publication {
        relation: Relation::GrafanaSource,
        fields: BTreeMap::from([
            ("port".to_string(), port.to_string()),
            ("source-type".to_string(), "prometheus".to_string()),
            ("private-address".to_string(), unit.advertise_address.clone()),
        ]),
    };

    vec![receive, datasource]
}

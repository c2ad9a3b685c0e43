//! Top-N selection for per-client gauges.

use crate::panel::models::ClientStat;

/// Returns the clients to publish for one traffic direction.
///
/// A `limit` of zero keeps every client in input order. Otherwise the clients
/// are ordered by `traffic` descending and the first `limit` are kept; the
/// sort is stable, so equal values keep their input order.
pub fn top_clients<F>(clients: &[ClientStat], limit: usize, traffic: F) -> Vec<&ClientStat>
where
    F: Fn(&ClientStat) -> i64,
{
    let mut ranked: Vec<&ClientStat> = clients.iter().collect();
    if limit == 0 {
        return ranked;
    }
    ranked.sort_by(|a, b| traffic(b).cmp(&traffic(a)));
    ranked.truncate(limit);
    ranked
}

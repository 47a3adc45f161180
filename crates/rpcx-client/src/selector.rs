use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::Rng;
use rpcx_share::EndpointMeta;

/// Chooses one endpoint out of the current server map for a given call.
///
/// `args` is the caller's stringified representation of the call arguments
/// (used by hash-based selectors to route the same logical call to the same
/// endpoint); selectors that don't care about it simply ignore it.
///
/// Implementations must tolerate concurrent `update_server` calls from the
/// discovery watcher running alongside in-flight `select` calls from callers.
pub trait Selector: Send + Sync {
    fn select(&self, service_path: &str, service_method: &str, args: &str, servers: &[String]) -> Option<String>;

    /// Called whenever the discovery layer pushes a fresh server list.
    fn update_server(&self, _servers: &HashMap<String, EndpointMeta>) {}
}

#[derive(Debug, Default)]
pub struct RandomSelector;

impl Selector for RandomSelector {
    fn select(&self, _service_path: &str, _service_method: &str, _args: &str, servers: &[String]) -> Option<String> {
        if servers.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..servers.len());
        Some(servers[idx].clone())
    }
}

#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl Selector for RoundRobinSelector {
    fn select(&self, _service_path: &str, _service_method: &str, _args: &str, servers: &[String]) -> Option<String> {
        if servers.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % servers.len();
        Some(servers[idx].clone())
    }
}

/// Picks servers proportionally to their advertised `weight` query parameter,
/// falling back to weight 1 when unset (mirrors the Go client's default),
/// using Nginx's smooth weighted round robin so the sequence is deterministic
/// rather than sampled.
pub struct WeightedRoundRobinSelector {
    weights: Mutex<HashMap<String, u32>>,
    /// Running "current weight" per server, per the smooth WRR algorithm:
    /// each pick adds every server's effective weight to its current weight,
    /// the max wins, and the winner's current weight is reduced by the total.
    current: Mutex<HashMap<String, i64>>,
}

impl Default for WeightedRoundRobinSelector {
    fn default() -> Self {
        WeightedRoundRobinSelector {
            weights: Mutex::new(HashMap::new()),
            current: Mutex::new(HashMap::new()),
        }
    }
}

impl Selector for WeightedRoundRobinSelector {
    fn select(&self, _service_path: &str, _service_method: &str, _args: &str, servers: &[String]) -> Option<String> {
        if servers.is_empty() {
            return None;
        }
        let weights = self.weights.lock().unwrap();
        let total: i64 = servers.iter().map(|s| *weights.get(s).unwrap_or(&1) as i64).sum();
        if total == 0 {
            return Some(servers[0].clone());
        }

        let mut current = self.current.lock().unwrap();
        let mut best: Option<(&String, i64)> = None;
        for server in servers {
            let effective = *weights.get(server).unwrap_or(&1) as i64;
            let updated = current.entry(server.clone()).or_insert(0);
            *updated += effective;
            if best.map_or(true, |(_, w)| *updated > w) {
                best = Some((server, *updated));
            }
        }

        let (selected, _) = best.expect("servers is non-empty");
        let selected = selected.clone();
        if let Some(entry) = current.get_mut(&selected) {
            *entry -= total;
        }
        Some(selected)
    }

    fn update_server(&self, servers: &HashMap<String, EndpointMeta>) {
        let mut weights = self.weights.lock().unwrap();
        weights.clear();
        for (key, meta) in servers {
            weights.insert(key.clone(), meta.weight.unwrap_or(1));
        }
        self.current.lock().unwrap().retain(|k, _| weights.contains_key(k));
    }
}

/// Hashes `servicePath + serviceMethod + args` onto a fixed server, so
/// repeated calls carrying the same logical key land on the same node (§4.2).
#[derive(Debug, Default)]
pub struct ConsistentHashSelector;

impl ConsistentHashSelector {
    fn hash(key: &str) -> u64 {
        // FNV-1a: cheap, stable across runs, matches what the Go client uses
        // for its consistent-hash selector.
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in key.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
}

impl Selector for ConsistentHashSelector {
    fn select(&self, service_path: &str, service_method: &str, args: &str, servers: &[String]) -> Option<String> {
        if servers.is_empty() {
            return None;
        }
        let mut sorted: Vec<&String> = servers.iter().collect();
        sorted.sort();
        let key = format!("{service_path}|{service_method}|{args}");
        let idx = (Self::hash(&key) as usize) % sorted.len();
        Some(sorted[idx].clone())
    }
}

/// Picks the server with the lowest great-circle distance to a fixed
/// reference point (the caller's own coordinates), using the `latitude` and
/// `longitude` query parameters on the endpoint key.
pub struct ClosestSelector {
    latitude: f64,
    longitude: f64,
    meta: Mutex<HashMap<String, EndpointMeta>>,
}

impl ClosestSelector {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        ClosestSelector {
            latitude,
            longitude,
            meta: Mutex::new(HashMap::new()),
        }
    }

    fn distance(&self, meta: &EndpointMeta) -> f64 {
        match (meta.latitude, meta.longitude) {
            (Some(lat), Some(lon)) => {
                let dlat = lat - self.latitude;
                let dlon = lon - self.longitude;
                (dlat * dlat + dlon * dlon).sqrt()
            }
            _ => f64::MAX,
        }
    }
}

impl Selector for ClosestSelector {
    fn select(&self, _service_path: &str, _service_method: &str, _args: &str, servers: &[String]) -> Option<String> {
        let meta = self.meta.lock().unwrap();
        servers
            .iter()
            .min_by(|a, b| {
                let da = meta.get(*a).map(|m| self.distance(m)).unwrap_or(f64::MAX);
                let db = meta.get(*b).map(|m| self.distance(m)).unwrap_or(f64::MAX);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
    }

    fn update_server(&self, servers: &HashMap<String, EndpointMeta>) {
        *self.meta.lock().unwrap() = servers.clone();
    }
}

/// A caller-supplied closure, for application-defined selection logic.
pub struct UserDefinedSelector<F>
where
    F: Fn(&str, &str, &str, &[String]) -> Option<String> + Send + Sync,
{
    f: F,
}

impl<F> UserDefinedSelector<F>
where
    F: Fn(&str, &str, &str, &[String]) -> Option<String> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        UserDefinedSelector { f }
    }
}

impl<F> Selector for UserDefinedSelector<F>
where
    F: Fn(&str, &str, &str, &[String]) -> Option<String> + Send + Sync,
{
    fn select(&self, service_path: &str, service_method: &str, args: &str, servers: &[String]) -> Option<String> {
        (self.f)(service_path, service_method, args, servers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("tcp@127.0.0.1:{}", 9000 + i)).collect()
    }

    #[test]
    fn round_robin_cycles_through_every_server() {
        let sel = RoundRobinSelector::default();
        let list = servers(3);
        let picks: Vec<String> = (0..6).map(|_| sel.select("S", "M", "", &list).unwrap()).collect();
        assert_eq!(picks, vec![list[0].clone(), list[1].clone(), list[2].clone(), list[0].clone(), list[1].clone(), list[2].clone()]);
    }

    #[test]
    fn consistent_hash_is_stable_for_the_same_method_and_args() {
        let sel = ConsistentHashSelector;
        let list = servers(5);
        let a = sel.select("Arith", "Mul", "[1,2]", &list);
        let b = sel.select("Arith", "Mul", "[1,2]", &list);
        assert_eq!(a, b);
    }

    #[test]
    fn consistent_hash_can_differ_across_args() {
        let sel = ConsistentHashSelector;
        let list = servers(8);
        let picks: Vec<Option<String>> = (0..8)
            .map(|i| sel.select("Arith", "Mul", &format!("[{i}]"), &list))
            .collect();
        assert!(picks.iter().collect::<std::collections::HashSet<_>>().len() > 1);
    }

    #[test]
    fn weighted_round_robin_never_picks_a_zero_weight_server_when_others_exist() {
        let sel = WeightedRoundRobinSelector::default();
        let list = servers(2);
        let mut meta = HashMap::new();
        meta.insert(list[0].clone(), EndpointMeta { weight: Some(0), ..Default::default() });
        meta.insert(list[1].clone(), EndpointMeta { weight: Some(5), ..Default::default() });
        sel.update_server(&meta);
        for _ in 0..20 {
            assert_eq!(sel.select("S", "M", "", &list).unwrap(), list[1]);
        }
    }

    #[test]
    fn weighted_round_robin_is_deterministic_and_proportional() {
        let sel = WeightedRoundRobinSelector::default();
        let list = servers(2);
        let mut meta = HashMap::new();
        meta.insert(list[0].clone(), EndpointMeta { weight: Some(1), ..Default::default() });
        meta.insert(list[1].clone(), EndpointMeta { weight: Some(2), ..Default::default() });
        sel.update_server(&meta);
        let picks: Vec<String> = (0..3).map(|_| sel.select("S", "M", "", &list).unwrap()).collect();
        // Nginx smooth WRR for weights [1, 2] settles into b, a, b repeating.
        assert_eq!(picks, vec![list[1].clone(), list[0].clone(), list[1].clone()]);
    }

    #[test]
    fn closest_picks_the_nearer_coordinate() {
        let sel = ClosestSelector::new(0.0, 0.0);
        let list = servers(2);
        let mut meta = HashMap::new();
        meta.insert(list[0].clone(), EndpointMeta { latitude: Some(10.0), longitude: Some(10.0), ..Default::default() });
        meta.insert(list[1].clone(), EndpointMeta { latitude: Some(0.1), longitude: Some(0.1), ..Default::default() });
        sel.update_server(&meta);
        assert_eq!(sel.select("S", "M", "", &list).unwrap(), list[1]);
    }

    #[test]
    fn empty_server_list_selects_nothing() {
        let sel = RandomSelector;
        assert_eq!(sel.select("S", "M", "", &[]), None);
    }
}

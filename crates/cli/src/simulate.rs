//! `tracechain simulate` -- drive a running server with randomized sensor
//! readings followed by a transport event.

use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};

use crate::seed::DEMO_LOT;

/// Settings for one simulation run.
pub(crate) struct SimulateOptions {
    pub(crate) base_url: String,
    pub(crate) readings: usize,
    pub(crate) interval: Duration,
    pub(crate) api_key: Option<String>,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// A plausible field reading for the demo lot.
pub(crate) fn random_reading<R: Rng + ?Sized>(rng: &mut R) -> Value {
    json!({
        "lot_id": DEMO_LOT,
        "farm_name": "Baan Mae Rim Farm",
        "temperature_c": round2(rng.gen_range(9.0..=18.0)),
        "humidity_pct": round2(rng.gen_range(75.0..=95.0)),
        "soil_moisture_pct": round2(rng.gen_range(25.0..=45.0)),
        "ph": round2(rng.gen_range(5.8..=7.2)),
    })
}

pub(crate) fn departure() -> Value {
    json!({
        "lot_id": DEMO_LOT,
        "location": "Truck CM-102",
        "temperature_c": 11.2,
        "humidity_pct": 89.0,
        "note": "Departed Mae Rim",
    })
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

struct Client {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
}

impl Client {
    fn post(&self, path: &str, body: Option<&Value>) -> Result<Value, String> {
        let url = endpoint(&self.base_url, path);
        let mut request = self.agent.post(&url);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        let response = match body {
            Some(body) => request.send_json(body),
            None => request.send_empty(),
        }
        .map_err(|e| format!("POST {} failed: {}", url, e))?;

        response
            .into_body()
            .read_json::<Value>()
            .map_err(|e| format!("could not parse response from {}: {}", url, e))
    }
}

/// Seed the demo lot, post the readings, then the transport event.
///
/// `on_step` receives one line per request describing the server's answer.
pub(crate) fn run_simulation(
    options: &SimulateOptions,
    mut on_step: impl FnMut(&str),
) -> Result<(), String> {
    let client = Client {
        agent: ureq::Agent::new_with_defaults(),
        base_url: options.base_url.clone(),
        api_key: options.api_key.clone(),
    };

    let seeded = client.post("/api/seed", None)?;
    on_step(&format!("seed: {}", seeded));

    let mut rng = rand::thread_rng();
    for i in 0..options.readings {
        let reading = random_reading(&mut rng);
        let answer = client.post("/api/sensors", Some(&reading))?;
        tracing::debug!(reading = %reading, "posted sensor reading");
        on_step(&format!("sensor {}: {}", i, answer));
        if i + 1 < options.readings {
            std::thread::sleep(options.interval);
        }
    }

    let answer = client.post("/api/transport", Some(&departure()))?;
    on_step(&format!("transport: {}", answer));
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn readings_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let r = random_reading(&mut rng);
            let t = r["temperature_c"].as_f64().unwrap();
            let h = r["humidity_pct"].as_f64().unwrap();
            let s = r["soil_moisture_pct"].as_f64().unwrap();
            let ph = r["ph"].as_f64().unwrap();
            assert!((9.0..=18.0).contains(&t));
            assert!((75.0..=95.0).contains(&h));
            assert!((25.0..=45.0).contains(&s));
            assert!((5.8..=7.2).contains(&ph));
            assert_eq!(round2(t), t);
        }
    }

    #[test]
    fn readings_target_demo_lot() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(random_reading(&mut rng)["lot_id"], DEMO_LOT);
        assert_eq!(departure()["location"], "Truck CM-102");
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            endpoint("http://localhost:8000/", "/api/seed"),
            "http://localhost:8000/api/seed"
        );
        assert_eq!(
            endpoint("http://localhost:8000", "/api/seed"),
            "http://localhost:8000/api/seed"
        );
    }

    #[test]
    fn unreachable_server_is_an_error() {
        let options = SimulateOptions {
            base_url: "http://127.0.0.1:1".into(),
            readings: 1,
            interval: Duration::ZERO,
            api_key: None,
        };
        let err = run_simulation(&options, |_| {}).unwrap_err();
        assert!(err.contains("/api/seed"), "{err}");
    }
}

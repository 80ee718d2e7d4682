// API models and data shaping for the WMATA (Washington Metropolitan Area
// Transit Authority) Metrorail real-time map
// WMATA developer portal: https://developer.wmata.com/
//
// WMATA API Endpoints:
// - GTFS-RT Vehicle Positions: https://api.wmata.com/gtfs/rail-gtfsrt-vehiclepositions.pb
// - Station Predictions: https://api.wmata.com/StationPrediction.svc/json/GetPrediction/All
// - Static Rail GTFS: https://api.wmata.com/gtfs/rail-gtfs-static.zip
//
// All three endpoints require the api_key request header.
//
// Covered lines: Orange, Silver, Blue. Each line's stations are re-ordered
// against a hand-curated visiting-order table (data/ordered_*_list.txt)
// because neither the static GTFS nor the live feeds guarantee any order.

use reqwest::blocking;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use gtfs_rt::FeedMessage;
use prost::Message;
use chrono::{TimeZone, Utc};
use chrono_tz::America::New_York;
use std::io::Read;
use std::io::Cursor;
use zip::ZipArchive;
use std::time::{SystemTime, UNIX_EPOCH};
use std::path::PathBuf;
use std::fs;

// ============================================================================
// Data Structures
// ============================================================================

/// One of the three modeled rail lines, with everything the dashboard needs:
/// the curated-ordered station sequence and the live trains on the line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub line_name: String,
    pub line_code: String,
    /// Route identifier as it appears in the feeds ("ORANGE", "SILVER", "BLUE").
    pub route_id: String,
    pub color: String,
    pub trip_ids: HashSet<String>,
    pub stations: Vec<Station>,
    pub trains: Vec<Train>,
}

/// A station on a line. After sequencing, the neighbor slots point at the
/// adjacent station in each travel direction: slot 0 is the following station
/// in curated order, slot 1 the preceding one. At the two endpoints the
/// missing side falls back to the only adjacent station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    /// Platform suffix already stripped ("PF_A01_C" -> "PF_A01").
    pub station_id: String,
    /// Truncated to the text before the first comma.
    pub station_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub next_station_id_0: Option<String>,
    pub next_station_name_0: Option<String>,
    pub next_station_id_1: Option<String>,
    pub next_station_name_1: Option<String>,
    /// Upcoming arrival countdowns per direction group, in feed order.
    /// Values may be non-numeric ("BRD", "ARR").
    pub minutes_0: Vec<String>,
    pub minutes_1: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainStatus {
    IncomingAt,
    StoppedAt,
    InTransitTo,
}

impl TrainStatus {
    /// Maps the GTFS-RT current_status code. An absent code means
    /// IN_TRANSIT_TO per the GTFS-RT reference.
    pub fn from_raw(code: Option<i32>) -> Self {
        match code {
            Some(0) => TrainStatus::IncomingAt,
            Some(1) => TrainStatus::StoppedAt,
            _ => TrainStatus::InTransitTo,
        }
    }
}

/// A live vehicle from the GTFS-RT feed, validated at decode time: entities
/// missing a trip, route, direction or position are rejected by the fetcher.
/// The station labels are filled in by the locator join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Train {
    pub vehicle_id: String,
    pub trip_id: String,
    pub route_id: String,
    /// Direction flag, 0 or 1, aligned with the station neighbor slots.
    pub direction: u32,
    pub status: TrainStatus,
    pub latitude: f64,
    pub longitude: f64,
    /// Platform suffix already stripped, so it joins against station_id.
    pub stop_id: Option<String>,
    pub station_name: Option<String>,
    pub next_station_name_0: Option<String>,
    pub next_station_name_1: Option<String>,
}

/// One entry of the station prediction feed's "Trains" list. Group is the
/// raw 1-based direction bucket; Min may be non-numeric or absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RailPrediction {
    #[serde(rename = "Line", default)]
    pub line: String,
    #[serde(rename = "Group", default)]
    pub group: String,
    #[serde(rename = "LocationCode", default)]
    pub location_code: String,
    #[serde(rename = "LocationName", default)]
    pub location_name: String,
    #[serde(rename = "Min", default)]
    pub min: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionFeed {
    #[serde(rename = "Trains", default)]
    pub trains: Vec<RailPrediction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRecord {
    pub trip_id: String,
    pub route_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRecord {
    pub stop_id: String,
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
    pub parent_station: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTimeRecord {
    pub trip_id: String,
    pub stop_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineSummary {
    pub line_name: String,
    pub line_code: String,
    pub route_id: String,
    pub color: String,
    pub station_count: usize,
    pub train_count: usize,
}

impl From<&Line> for LineSummary {
    fn from(line: &Line) -> Self {
        LineSummary {
            line_name: line.line_name.clone(),
            line_code: line.line_code.clone(),
            route_id: line.route_id.clone(),
            color: line.color.clone(),
            station_count: line.stations.len(),
            train_count: line.trains.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetroNetwork {
    pub lines: Vec<Line>,
    pub last_refresh: i64,
}

// ============================================================================
// Schedule Cache Structure (static rail GTFS, persisted between runs)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleCache {
    pub trips: Vec<TripRecord>,
    pub stops: Vec<StopRecord>,
    pub stop_times: Vec<StopTimeRecord>,
    pub cached_at: u64,
}

impl ScheduleCache {
    pub fn is_expired(&self, max_age_days: u64) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let age_days = (now.saturating_sub(self.cached_at)) / 86400;
        age_days >= max_age_days
    }

    pub fn cache_path() -> PathBuf {
        let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("dcmetro_web");
        fs::create_dir_all(&path).ok();
        path.push("rail_schedule_cache.json");
        path
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::cache_path();
        let json = serde_json::to_string(self)
            .map_err(|e| MetroError::DataError(format!("Failed to serialize schedule cache: {}", e)))?;

        fs::write(&path, json)
            .map_err(|e| MetroError::DataError(format!("Failed to write schedule cache: {}", e)))?;

        println!("✓ Rail schedule cache saved to: {:?}", path);
        Ok(())
    }

    pub fn load(max_age_days: u64) -> Option<Self> {
        let path = Self::cache_path();

        if !path.exists() {
            println!("ℹ️  No rail schedule cache found, will download fresh data");
            return None;
        }

        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<ScheduleCache>(&contents) {
                Ok(cache) => {
                    if cache.is_expired(max_age_days) {
                        println!("⚠️  Rail schedule cache expired (>{} days old), refreshing...", max_age_days);
                        None
                    } else {
                        println!("✓ Rail schedule cache loaded");
                        println!("  • {} trips", cache.trips.len());
                        println!("  • {} stops", cache.stops.len());
                        println!("  • {} stop time entries", cache.stop_times.len());
                        Some(cache)
                    }
                }
                Err(e) => {
                    println!("⚠️  Failed to parse schedule cache ({}), will refresh", e);
                    None
                }
            },
            Err(e) => {
                println!("⚠️  Failed to read schedule cache file ({}), will refresh", e);
                None
            }
        }
    }
}

// ============================================================================
// Cache Structure for efficient refresh
// ============================================================================

#[derive(Debug, Clone)]
pub struct CachedMetroData {
    pub schedule: ScheduleCache,
    pub vehicles: Vec<Train>,
    pub predictions: Vec<RailPrediction>,
    pub lines: Vec<Line>,
    pub last_static_update: u64,
    pub last_dynamic_update: u64,
}

impl CachedMetroData {
    pub fn needs_static_refresh(&self, max_age_seconds: u64) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        now.saturating_sub(self.last_static_update) > max_age_seconds
    }

    pub fn to_network(&self) -> MetroNetwork {
        MetroNetwork {
            lines: self.lines.clone(),
            last_refresh: self.last_dynamic_update as i64,
        }
    }

    pub fn line_summaries(&self) -> Vec<LineSummary> {
        self.lines.iter().map(LineSummary::from).collect()
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum MetroError {
    NetworkError(String),
    ParseError(String),
    DataError(String),
    ConfigError(String),
}

impl std::fmt::Display for MetroError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetroError::NetworkError(e) => write!(f, "Network error: {}", e),
            MetroError::ParseError(e) => write!(f, "Parse error: {}", e),
            MetroError::DataError(e) => write!(f, "Data error: {}", e),
            MetroError::ConfigError(e) => write!(f, "Config error: {}", e),
        }
    }
}

impl std::error::Error for MetroError {}

pub type Result<T> = std::result::Result<T, MetroError>;

// ============================================================================
// Main Implementation
// ============================================================================

pub struct WmataModels;

impl WmataModels {
    const VEHICLE_POSITIONS_URL: &'static str =
        "https://api.wmata.com/gtfs/rail-gtfsrt-vehiclepositions.pb";
    const PREDICTIONS_URL: &'static str =
        "https://api.wmata.com/StationPrediction.svc/json/GetPrediction/All";
    const STATIC_GTFS_URL: &'static str = "https://api.wmata.com/gtfs/rail-gtfs-static.zip";
    const API_KEY_ENV: &'static str = "WMATA_API_KEY";
    const REQUEST_TIMEOUT_SECS: u64 = 30;
    const STATIC_DATA_MAX_AGE: u64 = 86400;
    const SCHEDULE_CACHE_MAX_AGE_DAYS: u64 = 7;

    /// (display name, line code, hex color). The route identifier in both
    /// feeds is the uppercased display name.
    pub const LINES: [(&'static str, &'static str, &'static str); 3] = [
        ("Orange", "OR", "ED8B00"),
        ("Silver", "SV", "919D9D"),
        ("Blue", "BL", "009CDE"),
    ];

    const ORANGE_ORDER: &'static str = include_str!("../data/ordered_orange_list.txt");
    const SILVER_ORDER: &'static str = include_str!("../data/ordered_silver_list.txt");
    const BLUE_ORDER: &'static str = include_str!("../data/ordered_blue_list.txt");

    pub fn api_key() -> Result<String> {
        match std::env::var(Self::API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(MetroError::ConfigError(format!(
                "{} is not set. Get a free key at https://developer.wmata.com and export it.",
                Self::API_KEY_ENV
            ))),
        }
    }

    pub fn initialize_cache(api_key: &str) -> Result<CachedMetroData> {
        println!("🔄 Initializing Metrorail data cache...");

        println!("\n🗓️  Loading static rail schedule...");
        let schedule = Self::load_schedule_data(api_key)?;

        println!("\n📡 Loading real-time data...");
        let vehicles = Self::fetch_vehicle_positions(api_key)?;
        println!("   ✓ Loaded {} train positions", vehicles.len());

        let predictions = Self::fetch_predictions(api_key)?;
        println!("   ✓ Loaded {} arrival predictions", predictions.len());

        let lines = Self::build_all_lines(&schedule, &vehicles, &predictions);
        for line in &lines {
            println!(
                "   ✓ {} line: {} stations, {} trains",
                line.line_name,
                line.stations.len(),
                line.trains.len()
            );
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        println!("\n✓ Cache initialized successfully!");

        Ok(CachedMetroData {
            schedule,
            vehicles,
            predictions,
            lines,
            last_static_update: now,
            last_dynamic_update: now,
        })
    }

    /// Re-fetches both live feeds and rebuilds all three lines. A failed
    /// fetch propagates and leaves the previous snapshot in place.
    pub fn refresh_dynamic_data(cache: &mut CachedMetroData, api_key: &str) -> Result<()> {
        let vehicles = Self::fetch_vehicle_positions(api_key)?;
        let predictions = Self::fetch_predictions(api_key)?;

        cache.vehicles = vehicles;
        cache.predictions = predictions;
        cache.lines = Self::build_all_lines(&cache.schedule, &cache.vehicles, &cache.predictions);

        cache.last_dynamic_update = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Ok(())
    }

    pub fn refresh_static_data(cache: &mut CachedMetroData, api_key: &str) -> Result<()> {
        println!("🔄 Refreshing static rail schedule...");

        cache.schedule = Self::download_schedule(api_key)?;
        cache.lines = Self::build_all_lines(&cache.schedule, &cache.vehicles, &cache.predictions);

        cache.last_static_update = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        println!("✓ Static schedule refreshed!");

        Ok(())
    }

    pub fn smart_refresh(cache: &mut CachedMetroData, api_key: &str) -> Result<()> {
        Self::refresh_dynamic_data(cache, api_key)?;

        if cache.needs_static_refresh(Self::STATIC_DATA_MAX_AGE) {
            Self::refresh_static_data(cache, api_key)?;
        }

        Ok(())
    }

    // ============================================================================
    // Static Rail Schedule Loading
    // ============================================================================

    pub fn load_schedule_data(api_key: &str) -> Result<ScheduleCache> {
        if let Some(cache) = ScheduleCache::load(Self::SCHEDULE_CACHE_MAX_AGE_DAYS) {
            return Ok(cache);
        }

        Self::download_schedule(api_key)
    }

    fn download_schedule(api_key: &str) -> Result<ScheduleCache> {
        println!("📥 Downloading WMATA static rail GTFS...");

        let client = Self::create_http_client()?;

        let response = client
            .get(Self::STATIC_GTFS_URL)
            .header("api_key", api_key)
            .send()
            .map_err(|e| MetroError::NetworkError(format!("Failed to download rail GTFS: {}", e)))?;

        if !response.status().is_success() {
            return Err(MetroError::NetworkError(format!(
                "Rail GTFS download failed with status: {}",
                response.status()
            )));
        }

        let zip_bytes = response
            .bytes()
            .map_err(|e| MetroError::NetworkError(format!("Failed to read rail GTFS zip: {}", e)))?;

        println!("✓ Downloaded {} KB, extracting...", zip_bytes.len() / 1024);

        let cursor = Cursor::new(zip_bytes);
        let mut archive = ZipArchive::new(cursor)
            .map_err(|e| MetroError::ParseError(format!("Failed to open rail GTFS zip: {}", e)))?;

        let trips = Self::parse_trips(&mut archive)?;
        println!("   ✓ Parsed {} trips", trips.len());

        let stops = Self::parse_stops(&mut archive)?;
        println!("   ✓ Parsed {} stops", stops.len());

        let stop_times = Self::parse_stop_times(&mut archive)?;
        println!("   ✓ Parsed {} stop time entries", stop_times.len());

        let cache = ScheduleCache {
            trips,
            stops,
            stop_times,
            cached_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        };

        if let Err(e) = cache.save() {
            eprintln!("⚠️  Warning: could not save schedule cache: {}", e);
        }

        Ok(cache)
    }

    fn read_archive_file(archive: &mut ZipArchive<Cursor<bytes::Bytes>>, name: &str) -> Result<String> {
        let mut file = archive
            .by_name(name)
            .map_err(|e| MetroError::DataError(format!("{} not found in rail GTFS archive: {}", name, e)))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| MetroError::DataError(format!("Failed to read {}: {}", name, e)))?;

        Ok(contents)
    }

    fn required_column(headers: &csv::StringRecord, file: &str, name: &str) -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| {
                MetroError::DataError(format!("{} is missing required column '{}'", file, name))
            })
    }

    fn parse_trips(archive: &mut ZipArchive<Cursor<bytes::Bytes>>) -> Result<Vec<TripRecord>> {
        let contents = Self::read_archive_file(archive, "trips.txt")?;
        Self::parse_trips_csv(&contents)
    }

    pub fn parse_trips_csv(contents: &str) -> Result<Vec<TripRecord>> {
        let mut rdr = csv::Reader::from_reader(contents.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| MetroError::DataError(format!("trips.txt has no header row: {}", e)))?
            .clone();

        let route_id_col = Self::required_column(&headers, "trips.txt", "route_id")?;
        let trip_id_col = Self::required_column(&headers, "trips.txt", "trip_id")?;

        let mut trips = Vec::new();
        for result in rdr.records() {
            let record = result
                .map_err(|e| MetroError::DataError(format!("Malformed row in trips.txt: {}", e)))?;

            match (record.get(trip_id_col), record.get(route_id_col)) {
                (Some(trip_id), Some(route_id)) => trips.push(TripRecord {
                    trip_id: trip_id.to_string(),
                    route_id: route_id.to_string(),
                }),
                _ => {
                    return Err(MetroError::DataError(
                        "Short row in trips.txt".to_string(),
                    ))
                }
            }
        }

        Ok(trips)
    }

    fn parse_stops(archive: &mut ZipArchive<Cursor<bytes::Bytes>>) -> Result<Vec<StopRecord>> {
        let contents = Self::read_archive_file(archive, "stops.txt")?;
        Self::parse_stops_csv(&contents)
    }

    pub fn parse_stops_csv(contents: &str) -> Result<Vec<StopRecord>> {
        let mut rdr = csv::Reader::from_reader(contents.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| MetroError::DataError(format!("stops.txt has no header row: {}", e)))?
            .clone();

        let stop_id_col = Self::required_column(&headers, "stops.txt", "stop_id")?;
        let stop_name_col = Self::required_column(&headers, "stops.txt", "stop_name")?;
        let stop_lat_col = Self::required_column(&headers, "stops.txt", "stop_lat")?;
        let stop_lon_col = Self::required_column(&headers, "stops.txt", "stop_lon")?;
        // parent_station is optional in GTFS; rows without it dedup on their own id
        let parent_col = headers.iter().position(|h| h.trim() == "parent_station");

        let mut stops = Vec::new();
        for result in rdr.records() {
            let record = result
                .map_err(|e| MetroError::DataError(format!("Malformed row in stops.txt: {}", e)))?;

            let (stop_id, stop_name, lat_str, lon_str) = match (
                record.get(stop_id_col),
                record.get(stop_name_col),
                record.get(stop_lat_col),
                record.get(stop_lon_col),
            ) {
                (Some(id), Some(name), Some(lat), Some(lon)) => (id, name, lat, lon),
                _ => return Err(MetroError::DataError("Short row in stops.txt".to_string())),
            };

            let stop_lat = lat_str.trim().parse::<f64>().map_err(|e| {
                MetroError::DataError(format!("Bad stop_lat for stop {}: {}", stop_id, e))
            })?;
            let stop_lon = lon_str.trim().parse::<f64>().map_err(|e| {
                MetroError::DataError(format!("Bad stop_lon for stop {}: {}", stop_id, e))
            })?;

            let parent_station = parent_col
                .and_then(|col| record.get(col))
                .unwrap_or("")
                .to_string();

            stops.push(StopRecord {
                stop_id: stop_id.to_string(),
                stop_name: stop_name.to_string(),
                stop_lat,
                stop_lon,
                parent_station,
            });
        }

        Ok(stops)
    }

    fn parse_stop_times(archive: &mut ZipArchive<Cursor<bytes::Bytes>>) -> Result<Vec<StopTimeRecord>> {
        let contents = Self::read_archive_file(archive, "stop_times.txt")?;
        Self::parse_stop_times_csv(&contents)
    }

    pub fn parse_stop_times_csv(contents: &str) -> Result<Vec<StopTimeRecord>> {
        let mut rdr = csv::Reader::from_reader(contents.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| MetroError::DataError(format!("stop_times.txt has no header row: {}", e)))?
            .clone();

        let trip_id_col = Self::required_column(&headers, "stop_times.txt", "trip_id")?;
        let stop_id_col = Self::required_column(&headers, "stop_times.txt", "stop_id")?;

        let mut stop_times = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| {
                MetroError::DataError(format!("Malformed row in stop_times.txt: {}", e))
            })?;

            match (record.get(trip_id_col), record.get(stop_id_col)) {
                (Some(trip_id), Some(stop_id)) => stop_times.push(StopTimeRecord {
                    trip_id: trip_id.to_string(),
                    stop_id: stop_id.to_string(),
                }),
                _ => {
                    return Err(MetroError::DataError(
                        "Short row in stop_times.txt".to_string(),
                    ))
                }
            }
        }

        Ok(stop_times)
    }

    // ============================================================================
    // Live Feed Fetching
    // ============================================================================

    fn create_http_client() -> Result<blocking::Client> {
        blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(Self::REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| MetroError::NetworkError(format!("Failed to create HTTP client: {}", e)))
    }

    pub fn fetch_vehicle_positions(api_key: &str) -> Result<Vec<Train>> {
        let client = Self::create_http_client()?;

        let response = client
            .get(Self::VEHICLE_POSITIONS_URL)
            .header("api_key", api_key)
            .header("Cache-Control", "no-cache")
            .send()
            .map_err(|e| MetroError::NetworkError(format!("Failed to fetch vehicle positions: {}", e)))?;

        if !response.status().is_success() {
            return Err(MetroError::NetworkError(format!(
                "Vehicle positions request failed with status: {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .map_err(|e| MetroError::NetworkError(format!("Failed to read vehicles response: {}", e)))?;

        let feed = FeedMessage::decode(&*body)
            .map_err(|e| MetroError::ParseError(format!("Failed to decode vehicles feed: {}", e)))?;

        let mut trains = Vec::new();
        let mut skipped = 0usize;
        for entity in feed.entity {
            let Some(vehicle) = entity.vehicle else { continue };
            match Self::train_from_vehicle(vehicle) {
                Some(train) => trains.push(train),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            eprintln!(
                "⚠️  Skipped {} vehicle entities missing trip, direction or position",
                skipped
            );
        }

        Ok(trains)
    }

    fn train_from_vehicle(vehicle: gtfs_rt::VehiclePosition) -> Option<Train> {
        let trip = vehicle.trip.as_ref()?;
        let trip_id = trip.trip_id.clone()?;
        let route_id = trip.route_id.clone()?;
        let direction = trip.direction_id?;
        let position = vehicle.position.as_ref()?;

        let vehicle_id = vehicle
            .vehicle
            .as_ref()
            .and_then(|v| v.id.clone())
            .unwrap_or_else(|| trip_id.clone());

        let status = TrainStatus::from_raw(vehicle.current_status);
        let stop_id = vehicle.stop_id.as_deref().map(Self::strip_platform_suffix);

        Some(Train {
            vehicle_id,
            trip_id,
            route_id,
            direction,
            status,
            latitude: position.latitude as f64,
            longitude: position.longitude as f64,
            stop_id,
            station_name: None,
            next_station_name_0: None,
            next_station_name_1: None,
        })
    }

    pub fn fetch_predictions(api_key: &str) -> Result<Vec<RailPrediction>> {
        let client = Self::create_http_client()?;

        let response = client
            .get(Self::PREDICTIONS_URL)
            .header("api_key", api_key)
            .send()
            .map_err(|e| MetroError::NetworkError(format!("Failed to fetch predictions: {}", e)))?;

        if !response.status().is_success() {
            return Err(MetroError::NetworkError(format!(
                "Predictions request failed with status: {}",
                response.status()
            )));
        }

        let feed: PredictionFeed = response
            .json()
            .map_err(|e| MetroError::ParseError(format!("Invalid predictions JSON: {}", e)))?;

        Ok(feed.trains)
    }

    // ============================================================================
    // Line Pipeline
    // ============================================================================

    /// Runs the full pipeline for all three lines: build, curated ordering,
    /// neighbor slots, train location join, prediction join.
    pub fn build_all_lines(
        schedule: &ScheduleCache,
        vehicles: &[Train],
        predictions: &[RailPrediction],
    ) -> Vec<Line> {
        Self::LINES
            .iter()
            .map(|&(name, code, color)| {
                let mut line = Self::build_line(name, code, color, schedule, vehicles);
                line.stations = Self::order_stations(line.stations, Self::curated_order_for(code));
                Self::link_neighbors(&mut line.stations);
                Self::locate_trains(&mut line);
                Self::attach_predictions(&mut line, predictions);
                line
            })
            .collect()
    }

    fn curated_order_for(code: &str) -> &'static str {
        match code {
            "OR" => Self::ORANGE_ORDER,
            "SV" => Self::SILVER_ORDER,
            _ => Self::BLUE_ORDER,
        }
    }

    /// Builds a line from the static tables and the live vehicle list. The
    /// station set is every stop referenced by the line's trips, one entry
    /// per parent station (first occurrence in stops.txt order wins).
    pub fn build_line(
        name: &str,
        code: &str,
        color: &str,
        schedule: &ScheduleCache,
        vehicles: &[Train],
    ) -> Line {
        let route_id = name.to_uppercase();

        let trains: Vec<Train> = vehicles
            .iter()
            .filter(|t| t.route_id == route_id)
            .cloned()
            .collect();

        let trip_ids: HashSet<String> = schedule
            .trips
            .iter()
            .filter(|t| t.route_id == route_id)
            .map(|t| t.trip_id.clone())
            .collect();

        let stop_ids: HashSet<&str> = schedule
            .stop_times
            .iter()
            .filter(|st| trip_ids.contains(&st.trip_id))
            .map(|st| st.stop_id.as_str())
            .collect();

        let mut seen_parents: HashSet<&str> = HashSet::new();
        let mut stations = Vec::new();
        for stop in &schedule.stops {
            if !stop_ids.contains(stop.stop_id.as_str()) {
                continue;
            }
            let dedup_key = if stop.parent_station.is_empty() {
                stop.stop_id.as_str()
            } else {
                stop.parent_station.as_str()
            };
            if !seen_parents.insert(dedup_key) {
                continue;
            }
            stations.push(Station {
                station_id: Self::strip_platform_suffix(&stop.stop_id),
                station_name: Self::short_station_name(&stop.stop_name),
                latitude: stop.stop_lat,
                longitude: stop.stop_lon,
                next_station_id_0: None,
                next_station_name_0: None,
                next_station_id_1: None,
                next_station_name_1: None,
                minutes_0: Vec::new(),
                minutes_1: Vec::new(),
            });
        }

        Line {
            line_name: name.to_string(),
            line_code: code.to_string(),
            route_id,
            color: color.to_string(),
            trip_ids,
            stations,
            trains,
        }
    }

    /// Parses a curated ordering table (single "Stations" column) into
    /// uppercased name -> position index. Duplicate names keep their first
    /// position.
    pub fn parse_curated_order(curated_csv: &str) -> HashMap<String, usize> {
        let mut order = HashMap::new();
        let mut rdr = csv::Reader::from_reader(curated_csv.as_bytes());
        for (rank, result) in rdr.records().enumerate() {
            if let Ok(record) = result {
                if let Some(name) = record.get(0) {
                    order.entry(name.trim().to_uppercase()).or_insert(rank);
                }
            }
        }
        order
    }

    /// Re-orders a line's station set into curated visiting order, joining on
    /// the uppercased display name. Stations without a curated entry are
    /// dropped: the curated table is the source of truth for membership.
    pub fn order_stations(stations: Vec<Station>, curated_csv: &str) -> Vec<Station> {
        let order = Self::parse_curated_order(curated_csv);

        let mut ranked: Vec<(usize, Station)> = stations
            .into_iter()
            .filter_map(|station| {
                order
                    .get(&station.station_name.to_uppercase())
                    .map(|&rank| (rank, station))
            })
            .collect();

        ranked.sort_by_key(|(rank, _)| *rank);
        ranked.into_iter().map(|(_, station)| station).collect()
    }

    /// Fills in the per-direction neighbor slots over an ordered sequence:
    /// neighbor(i, 0) = stations[i + 1], neighbor(i, 1) = stations[i - 1],
    /// with the endpoints falling back to their only adjacent station.
    pub fn link_neighbors(stations: &mut [Station]) {
        let refs: Vec<(String, String)> = stations
            .iter()
            .map(|s| (s.station_id.clone(), s.station_name.clone()))
            .collect();
        let len = refs.len();

        for (i, station) in stations.iter_mut().enumerate() {
            let ahead = if i + 1 < len {
                Some(i + 1)
            } else {
                i.checked_sub(1)
            };
            let behind = if i > 0 {
                Some(i - 1)
            } else if len > 1 {
                Some(1)
            } else {
                None
            };

            station.next_station_id_0 = ahead.map(|j| refs[j].0.clone());
            station.next_station_name_0 = ahead.map(|j| refs[j].1.clone());
            station.next_station_id_1 = behind.map(|j| refs[j].0.clone());
            station.next_station_name_1 = behind.map(|j| refs[j].1.clone());
        }
    }

    /// Left join, train-preserving: each train's stop reference is matched
    /// against the sequenced stations to attach the current and next-station
    /// labels. Trains at a stop outside the sequence keep empty labels.
    pub fn locate_trains(line: &mut Line) {
        let mut by_id: HashMap<&str, &Station> = HashMap::new();
        for station in &line.stations {
            by_id.entry(station.station_id.as_str()).or_insert(station);
        }

        for train in &mut line.trains {
            match train.stop_id.as_deref().and_then(|sid| by_id.get(sid)) {
                Some(station) => {
                    train.station_name = Some(station.station_name.clone());
                    train.next_station_name_0 = station.next_station_name_0.clone();
                    train.next_station_name_1 = station.next_station_name_1.clone();
                }
                None => {
                    train.station_name = None;
                    train.next_station_name_0 = None;
                    train.next_station_name_1 = None;
                }
            }
        }
    }

    /// Joins the prediction feed onto the sequenced stations. Predictions are
    /// filtered to the line's code, exact duplicate records dropped, grouped
    /// per (direction group, station code) in feed order, and the 1-based
    /// Group is normalized to the 0-based direction convention. The join key
    /// is the station code left after the 3-character feed prefix of the
    /// static identifier ("PF_A01" -> "A01").
    pub fn attach_predictions(line: &mut Line, predictions: &[RailPrediction]) {
        let mut seen: HashSet<&RailPrediction> = HashSet::new();
        let mut grouped: HashMap<(usize, &str), Vec<String>> = HashMap::new();
        let mut skipped_groups = 0usize;

        for prediction in predictions.iter().filter(|p| p.line == line.line_code) {
            if !seen.insert(prediction) {
                continue;
            }
            let group = match prediction.group.trim().parse::<i64>() {
                Ok(g @ 1..=2) => (g - 1) as usize,
                _ => {
                    skipped_groups += 1;
                    continue;
                }
            };
            grouped
                .entry((group, prediction.location_code.as_str()))
                .or_insert_with(Vec::new)
                .push(prediction.min.clone().unwrap_or_default());
        }

        if skipped_groups > 0 {
            eprintln!(
                "⚠️  Skipped {} {} predictions outside direction groups 1/2",
                skipped_groups, line.line_code
            );
        }

        for station in &mut line.stations {
            let code = Self::location_code(&station.station_id).to_string();
            station.minutes_0 = grouped.get(&(0, code.as_str())).cloned().unwrap_or_default();
            station.minutes_1 = grouped.get(&(1, code.as_str())).cloned().unwrap_or_default();
        }
    }

    // ============================================================================
    // Identifier Helpers
    // ============================================================================

    /// Drops the 2-character platform/direction suffix the live feeds carry
    /// on rail stop identifiers ("PF_A01_C" -> "PF_A01"). Identifiers too
    /// short to carry a suffix pass through unchanged.
    pub fn strip_platform_suffix(stop_id: &str) -> String {
        if stop_id.len() > 2 {
            stop_id
                .get(..stop_id.len() - 2)
                .unwrap_or(stop_id)
                .to_string()
        } else {
            stop_id.to_string()
        }
    }

    /// The prediction feed addresses stations by the short code left after
    /// the 3-character prefix of the static identifier ("PF_A01" -> "A01").
    pub fn location_code(station_id: &str) -> &str {
        station_id.get(3..).unwrap_or(station_id)
    }

    /// Truncates "STATION NAME, CITY, STATE" display names to the station
    /// name proper.
    pub fn short_station_name(stop_name: &str) -> String {
        stop_name
            .split(',')
            .next()
            .unwrap_or(stop_name)
            .trim_end()
            .to_string()
    }

    // ============================================================================
    // Timestamps & Stats
    // ============================================================================

    pub fn format_timestamp_full(timestamp: i64) -> String {
        match Utc.timestamp_opt(timestamp, 0).single() {
            Some(dt) => {
                let dc_time = dt.with_timezone(&New_York);
                dc_time.format("%Y-%m-%d %H:%M:%S").to_string()
            }
            None => format!("Invalid timestamp: {}", timestamp),
        }
    }

    pub fn get_current_timestamp() -> i64 {
        Utc::now().timestamp()
    }

    pub fn get_cache_stats(cache: &CachedMetroData) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let static_age = now.saturating_sub(cache.last_static_update);
        let dynamic_age = now.saturating_sub(cache.last_dynamic_update);

        let line_counts = cache
            .lines
            .iter()
            .map(|l| {
                format!(
                    "{}: {} stations / {} trains",
                    l.line_name,
                    l.stations.len(),
                    l.trains.len()
                )
            })
            .collect::<Vec<_>>()
            .join(" | ");

        format!(
            "📊 Cache Statistics:\n\
             • Schedule: {} trips, {} stops, {} stop times\n\
             • {}\n\
             • Vehicles tracked: {} | Predictions: {}\n\
             • Static data age: {}s | Dynamic data age: {}s\n\
             • Last update: {}",
            cache.schedule.trips.len(),
            cache.schedule.stops.len(),
            cache.schedule.stop_times.len(),
            line_counts,
            cache.vehicles.len(),
            cache.predictions.len(),
            static_age,
            dynamic_age,
            Self::format_timestamp_full(cache.last_dynamic_update as i64)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: &str, name: &str) -> Station {
        Station {
            station_id: id.to_string(),
            station_name: name.to_string(),
            latitude: 38.9,
            longitude: -77.03,
            next_station_id_0: None,
            next_station_name_0: None,
            next_station_id_1: None,
            next_station_name_1: None,
            minutes_0: Vec::new(),
            minutes_1: Vec::new(),
        }
    }

    fn train(route_id: &str, direction: u32, stop_id: Option<&str>) -> Train {
        Train {
            vehicle_id: "Train001".to_string(),
            trip_id: "trip-1".to_string(),
            route_id: route_id.to_string(),
            direction,
            status: TrainStatus::InTransitTo,
            latitude: 38.9,
            longitude: -77.03,
            stop_id: stop_id.map(String::from),
            station_name: None,
            next_station_name_0: None,
            next_station_name_1: None,
        }
    }

    fn prediction(line: &str, group: &str, code: &str, name: &str, min: &str) -> RailPrediction {
        RailPrediction {
            line: line.to_string(),
            group: group.to_string(),
            location_code: code.to_string(),
            location_name: name.to_string(),
            min: Some(min.to_string()),
        }
    }

    const CURATED: &str = "Stations\nAlpha\nBravo\nCharlie\nDelta\n";

    fn sequenced_acd() -> Vec<Station> {
        // Curated order is [Alpha, Bravo, Charlie, Delta]; Bravo is absent
        // from the live-derived set.
        let raw = vec![
            station("PF_D04", "Delta"),
            station("PF_A01", "Alpha"),
            station("PF_C03", "Charlie"),
        ];
        let mut ordered = WmataModels::order_stations(raw, CURATED);
        WmataModels::link_neighbors(&mut ordered);
        ordered
    }

    #[test]
    fn strips_platform_suffix() {
        assert_eq!(WmataModels::strip_platform_suffix("PF_A01_C"), "PF_A01");
        assert_eq!(WmataModels::strip_platform_suffix("PF_K08_1"), "PF_K08");
        // too short to carry a suffix
        assert_eq!(WmataModels::strip_platform_suffix("A1"), "A1");
    }

    #[test]
    fn location_code_skips_feed_prefix() {
        assert_eq!(WmataModels::location_code("PF_A01"), "A01");
        assert_eq!(WmataModels::location_code("A01"), "");
        assert_eq!(WmataModels::location_code("X"), "X");
    }

    #[test]
    fn short_station_name_truncates_at_first_comma() {
        assert_eq!(
            WmataModels::short_station_name("METRO CENTER, 607 13TH ST. NW, WASHINGTON"),
            "METRO CENTER"
        );
        assert_eq!(WmataModels::short_station_name("ROSSLYN"), "ROSSLYN");
    }

    #[test]
    fn curated_order_is_parsed_case_insensitively() {
        let order = WmataModels::parse_curated_order(CURATED);
        assert_eq!(order.get("ALPHA"), Some(&0));
        assert_eq!(order.get("DELTA"), Some(&3));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn order_stations_follows_curated_order() {
        let ordered = sequenced_acd();
        let names: Vec<&str> = ordered.iter().map(|s| s.station_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Charlie", "Delta"]);
    }

    #[test]
    fn order_stations_drops_uncurated_station() {
        let raw = vec![station("PF_A01", "Alpha"), station("PF_Z99", "Zulu")];
        let ordered = WmataModels::order_stations(raw, CURATED);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].station_name, "Alpha");
    }

    #[test]
    fn order_stations_is_idempotent() {
        let once = WmataModels::order_stations(sequenced_acd(), CURATED);
        let twice = WmataModels::order_stations(once.clone(), CURATED);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.station_id, b.station_id);
        }
    }

    #[test]
    fn link_neighbors_interior_and_endpoint_fallbacks() {
        // Scenario: sequence [Alpha, Charlie, Delta]
        let ordered = sequenced_acd();

        // Alpha: slot 0 = Charlie, slot 1 falls back to Charlie (origin)
        assert_eq!(ordered[0].next_station_name_0.as_deref(), Some("Charlie"));
        assert_eq!(ordered[0].next_station_name_1.as_deref(), Some("Charlie"));

        // Charlie (interior): slot 0 = Delta, slot 1 = Alpha
        assert_eq!(ordered[1].next_station_name_0.as_deref(), Some("Delta"));
        assert_eq!(ordered[1].next_station_id_0.as_deref(), Some("PF_D04"));
        assert_eq!(ordered[1].next_station_name_1.as_deref(), Some("Alpha"));
        assert_eq!(ordered[1].next_station_id_1.as_deref(), Some("PF_A01"));

        // Delta: slot 0 falls back to Charlie (terminus), slot 1 = Charlie
        assert_eq!(ordered[2].next_station_name_0.as_deref(), Some("Charlie"));
        assert_eq!(ordered[2].next_station_name_1.as_deref(), Some("Charlie"));
    }

    #[test]
    fn link_neighbors_single_station_has_no_neighbors() {
        let mut stations = vec![station("PF_A01", "Alpha")];
        WmataModels::link_neighbors(&mut stations);
        assert!(stations[0].next_station_name_0.is_none());
        assert!(stations[0].next_station_name_1.is_none());
    }

    #[test]
    fn locate_trains_resolves_next_station_per_direction() {
        // Scenario: a train at Charlie heading in direction 1 is next due at
        // Alpha, Charlie's preceding neighbor.
        let mut line = Line {
            line_name: "Orange".to_string(),
            line_code: "OR".to_string(),
            route_id: "ORANGE".to_string(),
            color: "ED8B00".to_string(),
            trip_ids: HashSet::new(),
            stations: sequenced_acd(),
            trains: vec![train("ORANGE", 1, Some("PF_C03"))],
        };

        WmataModels::locate_trains(&mut line);

        let located = &line.trains[0];
        assert_eq!(located.station_name.as_deref(), Some("Charlie"));
        assert_eq!(located.next_station_name_1.as_deref(), Some("Alpha"));
        assert_eq!(located.next_station_name_0.as_deref(), Some("Delta"));
    }

    #[test]
    fn locate_trains_preserves_unmatched_trains() {
        let mut line = Line {
            line_name: "Orange".to_string(),
            line_code: "OR".to_string(),
            route_id: "ORANGE".to_string(),
            color: "ED8B00".to_string(),
            trip_ids: HashSet::new(),
            stations: sequenced_acd(),
            trains: vec![train("ORANGE", 0, Some("PF_X77")), train("ORANGE", 0, None)],
        };

        WmataModels::locate_trains(&mut line);

        assert_eq!(line.trains.len(), 2);
        for t in &line.trains {
            assert!(t.station_name.is_none());
            assert!(t.next_station_name_0.is_none());
            assert!(t.next_station_name_1.is_none());
        }
    }

    #[test]
    fn attach_predictions_groups_normalizes_and_pivots() {
        // Scenario: Group "1" carries ["3", "BRD"] for Alpha, Group "2"
        // carries ["7"]; raw group 1 maps to direction 0, 2 to 1.
        let mut line = Line {
            line_name: "Orange".to_string(),
            line_code: "OR".to_string(),
            route_id: "ORANGE".to_string(),
            color: "ED8B00".to_string(),
            trip_ids: HashSet::new(),
            stations: sequenced_acd(),
            trains: Vec::new(),
        };
        let predictions = vec![
            prediction("OR", "1", "A01", "Alpha", "3"),
            prediction("OR", "1", "A01", "Alpha", "BRD"),
            prediction("OR", "2", "A01", "Alpha", "7"),
        ];

        WmataModels::attach_predictions(&mut line, &predictions);

        let alpha = &line.stations[0];
        assert_eq!(alpha.minutes_0, vec!["3".to_string(), "BRD".to_string()]);
        assert_eq!(alpha.minutes_1, vec!["7".to_string()]);
    }

    #[test]
    fn attach_predictions_skips_other_lines_and_odd_groups() {
        let mut line = Line {
            line_name: "Orange".to_string(),
            line_code: "OR".to_string(),
            route_id: "ORANGE".to_string(),
            color: "ED8B00".to_string(),
            trip_ids: HashSet::new(),
            stations: sequenced_acd(),
            trains: Vec::new(),
        };
        let predictions = vec![
            prediction("SV", "1", "A01", "Alpha", "4"),
            prediction("OR", "3", "A01", "Alpha", "9"),
            prediction("OR", "", "A01", "Alpha", "2"),
        ];

        WmataModels::attach_predictions(&mut line, &predictions);

        assert!(line.stations[0].minutes_0.is_empty());
        assert!(line.stations[0].minutes_1.is_empty());
    }

    #[test]
    fn attach_predictions_drops_exact_duplicate_records() {
        let mut line = Line {
            line_name: "Orange".to_string(),
            line_code: "OR".to_string(),
            route_id: "ORANGE".to_string(),
            color: "ED8B00".to_string(),
            trip_ids: HashSet::new(),
            stations: sequenced_acd(),
            trains: Vec::new(),
        };
        let predictions = vec![
            prediction("OR", "1", "A01", "Alpha", "5"),
            prediction("OR", "1", "A01", "Alpha", "5"),
        ];

        WmataModels::attach_predictions(&mut line, &predictions);

        assert_eq!(line.stations[0].minutes_0, vec!["5".to_string()]);
    }

    #[test]
    fn attach_predictions_leaves_unmatched_stations_empty() {
        let mut line = Line {
            line_name: "Orange".to_string(),
            line_code: "OR".to_string(),
            route_id: "ORANGE".to_string(),
            color: "ED8B00".to_string(),
            trip_ids: HashSet::new(),
            stations: sequenced_acd(),
            trains: Vec::new(),
        };
        let predictions = vec![prediction("OR", "1", "A01", "Alpha", "6")];

        WmataModels::attach_predictions(&mut line, &predictions);

        // Charlie and Delta had no predictions
        assert!(line.stations[1].minutes_0.is_empty());
        assert!(line.stations[2].minutes_0.is_empty());
    }

    fn schedule_fixture() -> ScheduleCache {
        ScheduleCache {
            trips: vec![
                TripRecord {
                    trip_id: "trip-or-1".to_string(),
                    route_id: "ORANGE".to_string(),
                },
                TripRecord {
                    trip_id: "trip-bl-1".to_string(),
                    route_id: "BLUE".to_string(),
                },
            ],
            stops: vec![
                StopRecord {
                    stop_id: "PF_A01_C".to_string(),
                    stop_name: "ALPHA, 100 MAIN ST".to_string(),
                    stop_lat: 38.90,
                    stop_lon: -77.03,
                    parent_station: "STN_A01".to_string(),
                },
                StopRecord {
                    stop_id: "PF_A01_D".to_string(),
                    stop_name: "ALPHA, 100 MAIN ST".to_string(),
                    stop_lat: 38.90,
                    stop_lon: -77.03,
                    parent_station: "STN_A01".to_string(),
                },
                StopRecord {
                    stop_id: "PF_C03_C".to_string(),
                    stop_name: "CHARLIE".to_string(),
                    stop_lat: 38.92,
                    stop_lon: -77.05,
                    parent_station: "STN_C03".to_string(),
                },
                StopRecord {
                    stop_id: "PF_B99_C".to_string(),
                    stop_name: "BLUE ONLY".to_string(),
                    stop_lat: 38.85,
                    stop_lon: -77.06,
                    parent_station: "STN_B99".to_string(),
                },
            ],
            stop_times: vec![
                StopTimeRecord {
                    trip_id: "trip-or-1".to_string(),
                    stop_id: "PF_A01_C".to_string(),
                },
                StopTimeRecord {
                    trip_id: "trip-or-1".to_string(),
                    stop_id: "PF_A01_D".to_string(),
                },
                StopTimeRecord {
                    trip_id: "trip-or-1".to_string(),
                    stop_id: "PF_C03_C".to_string(),
                },
                StopTimeRecord {
                    trip_id: "trip-bl-1".to_string(),
                    stop_id: "PF_B99_C".to_string(),
                },
            ],
            cached_at: 0,
        }
    }

    #[test]
    fn build_line_filters_by_route_and_dedups_parent_stations() {
        let schedule = schedule_fixture();
        let vehicles = vec![
            train("ORANGE", 0, Some("PF_A01")),
            train("BLUE", 0, Some("PF_B99")),
        ];

        let line = WmataModels::build_line("Orange", "OR", "ED8B00", &schedule, &vehicles);

        assert_eq!(line.route_id, "ORANGE");
        assert_eq!(line.trains.len(), 1);
        assert_eq!(line.trip_ids.len(), 1);

        // The two ALPHA platforms collapse to one station; BLUE ONLY is
        // not part of this line.
        assert_eq!(line.stations.len(), 2);
        assert_eq!(line.stations[0].station_id, "PF_A01");
        assert_eq!(line.stations[0].station_name, "ALPHA");
        assert_eq!(line.stations[1].station_name, "CHARLIE");
    }

    #[test]
    fn build_line_with_no_matching_vehicles_is_not_an_error() {
        let schedule = schedule_fixture();
        let line = WmataModels::build_line("Silver", "SV", "919D9D", &schedule, &[]);
        assert!(line.trains.is_empty());
        assert!(line.stations.is_empty());
    }

    #[test]
    fn parse_trips_csv_resolves_columns_from_header() {
        // Column order differs from the usual GTFS layout on purpose.
        let contents = "trip_id,service_id,route_id\ntrip-1,WK,ORANGE\n";
        let trips = WmataModels::parse_trips_csv(contents).unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].trip_id, "trip-1");
        assert_eq!(trips[0].route_id, "ORANGE");
    }

    #[test]
    fn parse_trips_csv_missing_column_is_a_data_error() {
        let contents = "trip_id,service_id\ntrip-1,WK\n";
        let err = WmataModels::parse_trips_csv(contents).unwrap_err();
        assert!(matches!(err, MetroError::DataError(_)));
    }

    #[test]
    fn parse_stops_csv_reads_coordinates_and_optional_parent() {
        let with_parent =
            "stop_id,stop_name,stop_lat,stop_lon,parent_station\nPF_A01_C,ALPHA,38.9,-77.03,STN_A01\n";
        let stops = WmataModels::parse_stops_csv(with_parent).unwrap();
        assert_eq!(stops[0].parent_station, "STN_A01");
        assert_eq!(stops[0].stop_lat, 38.9);

        let without_parent = "stop_id,stop_name,stop_lat,stop_lon\nPF_A01_C,ALPHA,38.9,-77.03\n";
        let stops = WmataModels::parse_stops_csv(without_parent).unwrap();
        assert_eq!(stops[0].parent_station, "");
    }

    #[test]
    fn parse_stops_csv_bad_coordinate_is_a_data_error() {
        let contents = "stop_id,stop_name,stop_lat,stop_lon\nPF_A01_C,ALPHA,not-a-number,-77.03\n";
        let err = WmataModels::parse_stops_csv(contents).unwrap_err();
        assert!(matches!(err, MetroError::DataError(_)));
    }

    #[test]
    fn train_status_maps_gtfs_rt_codes() {
        assert_eq!(TrainStatus::from_raw(Some(0)), TrainStatus::IncomingAt);
        assert_eq!(TrainStatus::from_raw(Some(1)), TrainStatus::StoppedAt);
        assert_eq!(TrainStatus::from_raw(Some(2)), TrainStatus::InTransitTo);
        assert_eq!(TrainStatus::from_raw(None), TrainStatus::InTransitTo);
    }

    #[test]
    fn embedded_curated_tables_parse() {
        for (code, expected_first) in [
            ("OR", "VIENNA FAIRFAX-GMU"),
            ("SV", "ASHBURN"),
            ("BL", "FRANCONIA-SPRINGFIELD"),
        ] {
            let order = WmataModels::parse_curated_order(WmataModels::curated_order_for(code));
            assert!(order.len() > 20, "{} table suspiciously small", code);
            assert_eq!(order.get(expected_first), Some(&0));
        }
    }
}

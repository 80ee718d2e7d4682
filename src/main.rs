// Backend API server with embedded frontend
// DC Metrorail real-time map server for the Orange, Silver and Blue lines

use actix_web::{web, App, HttpServer, HttpResponse, middleware};
use actix_cors::Cors;
use serde::Serialize;
use std::sync::{Arc, Mutex};

mod wmata_api_models;
use wmata_api_models::{CachedMetroData, WmataModels};

// Embed static files at compile time
const INDEX_HTML: &str = include_str!("../static/metromap.html");
const METRO_JS: &str = include_str!("../static/metro-map.js");

#[derive(Clone)]
struct AppState {
    cache: Arc<Mutex<CachedMetroData>>,
    api_key: String,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    timestamp: i64,
    sources: Vec<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: WmataModels::get_current_timestamp(),
            sources: vec!["WMATA".to_string()],
        }
    }

    fn error(message: String) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: WmataModels::get_current_timestamp(),
            sources: vec![],
        }
    }
}

// ============================================================================
// Frontend Routes
// ============================================================================

async fn serve_index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

async fn serve_js() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/javascript; charset=utf-8")
        .body(METRO_JS)
}

// ============================================================================
// API Endpoints
// ============================================================================

async fn get_network(state: web::Data<AppState>) -> HttpResponse {
    match state.cache.lock() {
        Ok(cache) => {
            let network = cache.to_network();
            println!(
                "📊 Network data requested: {} lines, {} trains",
                network.lines.len(),
                network.lines.iter().map(|l| l.trains.len()).sum::<usize>()
            );
            HttpResponse::Ok().json(ApiResponse::success(network))
        }
        Err(e) => {
            eprintln!("❌ Failed to lock cache: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<String>::error(
                    "Failed to retrieve network data".to_string()
                ))
        }
    }
}

async fn get_lines(state: web::Data<AppState>) -> HttpResponse {
    match state.cache.lock() {
        Ok(cache) => {
            let summaries = cache.line_summaries();
            println!("🚇 Lines requested: {} total", summaries.len());
            HttpResponse::Ok().json(ApiResponse::success(summaries))
        }
        Err(e) => {
            eprintln!("❌ Failed to lock cache: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<Vec<wmata_api_models::LineSummary>>::error(
                    "Failed to retrieve lines".to_string()
                ))
        }
    }
}

async fn get_line_by_code(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let line_code = path.into_inner();

    match state.cache.lock() {
        Ok(cache) => {
            match cache.lines.iter().find(|l|
                l.line_code.eq_ignore_ascii_case(&line_code)
            ) {
                Some(line) => {
                    println!(
                        "🚇 Line retrieved: {} ({}) - {} stations, {} trains",
                        line.line_name,
                        line.line_code,
                        line.stations.len(),
                        line.trains.len()
                    );
                    HttpResponse::Ok().json(ApiResponse::success(line))
                }
                None => {
                    println!("⚠️  Line not found: {}", line_code);
                    HttpResponse::NotFound()
                        .json(ApiResponse::<String>::error(
                            format!("Line '{}' not found", line_code)
                        ))
                }
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to lock cache: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<String>::error(
                    "Failed to retrieve line".to_string()
                ))
        }
    }
}

async fn get_line_stations(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let line_code = path.into_inner();

    match state.cache.lock() {
        Ok(cache) => {
            match cache.lines.iter().find(|l|
                l.line_code.eq_ignore_ascii_case(&line_code)
            ) {
                Some(line) => {
                    println!(
                        "📍 Stations requested for {}: {} total",
                        line.line_code,
                        line.stations.len()
                    );
                    HttpResponse::Ok().json(ApiResponse::success(&line.stations))
                }
                None => {
                    println!("⚠️  Line not found: {}", line_code);
                    HttpResponse::NotFound()
                        .json(ApiResponse::<String>::error(
                            format!("Line '{}' not found", line_code)
                        ))
                }
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to lock cache: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<String>::error(
                    "Failed to retrieve stations".to_string()
                ))
        }
    }
}

async fn get_line_trains(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let line_code = path.into_inner();

    match state.cache.lock() {
        Ok(cache) => {
            match cache.lines.iter().find(|l|
                l.line_code.eq_ignore_ascii_case(&line_code)
            ) {
                Some(line) => {
                    println!(
                        "🚆 Trains requested for {}: {} active",
                        line.line_code,
                        line.trains.len()
                    );
                    HttpResponse::Ok().json(ApiResponse::success(&line.trains))
                }
                None => {
                    println!("⚠️  Line not found: {}", line_code);
                    HttpResponse::NotFound()
                        .json(ApiResponse::<String>::error(
                            format!("Line '{}' not found", line_code)
                        ))
                }
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to lock cache: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<String>::error(
                    "Failed to retrieve trains".to_string()
                ))
        }
    }
}

async fn get_stats(state: web::Data<AppState>) -> HttpResponse {
    match state.cache.lock() {
        Ok(cache) => {
            let stats = WmataModels::get_cache_stats(&cache);
            println!("📊 Stats requested");
            HttpResponse::Ok().json(ApiResponse::success(stats))
        }
        Err(e) => {
            eprintln!("❌ Failed to lock cache: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<String>::error(
                    "Failed to retrieve stats".to_string()
                ))
        }
    }
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "DC Metrorail Real-time Map",
        "version": "0.1.0",
        "sources": ["WMATA"],
        "timestamp": WmataModels::get_current_timestamp(),
        "embedded_frontend": true
    }))
}

async fn force_refresh(state: web::Data<AppState>) -> HttpResponse {
    println!("🔄 Manual refresh requested...");

    let state_clone = state.cache.clone();
    let api_key = state.api_key.clone();
    match tokio::task::spawn_blocking(move || {
        match state_clone.lock() {
            Ok(mut cache) => WmataModels::smart_refresh(&mut cache, &api_key),
            Err(e) => Err(wmata_api_models::MetroError::NetworkError(
                format!("Failed to lock cache: {}", e)
            ))
        }
    }).await {
        Ok(Ok(())) => {
            println!("✓ Manual refresh completed successfully");
            HttpResponse::Ok().json(ApiResponse::success("Data refreshed successfully"))
        }
        Ok(Err(e)) => {
            eprintln!("⚠️  Manual refresh failed: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<String>::error(
                    format!("Refresh failed: {}", e)
                ))
        }
        Err(e) => {
            eprintln!("❌ Manual refresh task panicked: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<String>::error(
                    "Refresh task panicked".to_string()
                ))
        }
    }
}

// ============================================================================
// Server Setup
// ============================================================================

async fn run_server(cache: CachedMetroData, api_key: String) -> std::io::Result<()> {
    let app_state = AppState {
        cache: Arc::new(Mutex::new(cache)),
        api_key,
    };

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║   🚇 DC Metrorail Real-time Map Server (Embedded UI)       ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");
    println!("🌐 Server running on: http://0.0.0.0:8080");
    println!("📱 Web UI available at: http://localhost:8080");
    println!("📡 API available at: http://localhost:8080/api/metro\n");

    println!("📍 Available Routes:");
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ Frontend:                                                   │");
    println!("│   GET  /                              - Web UI (embedded)   │");
    println!("│   GET  /metro-map.js                  - JavaScript (embedded)│");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ API - Network Data:                                         │");
    println!("│   GET  /api/metro/network             - All lines, full data│");
    println!("│   GET  /api/metro/lines               - Line summaries      │");
    println!("│   GET  /api/metro/line/:code          - Line by code        │");
    println!("│   GET  /api/metro/line/:code/stations - Sequenced stations  │");
    println!("│   GET  /api/metro/line/:code/trains   - Live trains         │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ API - Meta & Control:                                       │");
    println!("│   GET  /api/metro/stats               - Cache statistics    │");
    println!("│   POST /api/metro/refresh             - Force refresh data  │");
    println!("│   GET  /health                        - Health check        │");
    println!("└─────────────────────────────────────────────────────────────┘\n");

    println!("💡 Quick Start:");
    println!("   1. Open your browser to: http://localhost:8080");
    println!("   2. Pick a line, toggle direction");
    println!("   3. Data refreshes only when you hit Refresh Data\n");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            // Frontend routes
            .route("/", web::get().to(serve_index))
            .route("/metro-map.js", web::get().to(serve_js))
            // Health check
            .route("/health", web::get().to(health_check))
            // API routes
            .service(
                web::scope("/api/metro")
                    .route("/network", web::get().to(get_network))
                    .route("/lines", web::get().to(get_lines))
                    .route("/line/{code}", web::get().to(get_line_by_code))
                    .route("/line/{code}/stations", web::get().to(get_line_stations))
                    .route("/line/{code}/trains", web::get().to(get_line_trains))
                    .route("/stats", web::get().to(get_stats))
                    .route("/refresh", web::post().to(force_refresh))
            )
    })
        .bind(("0.0.0.0", 8080))?
        .run()
        .await
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> std::io::Result<()> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║                                                            ║");
    println!("║    🚇 DC Metrorail Real-time Map Server                    ║");
    println!("║       with Embedded Web UI                                 ║");
    println!("║                                                            ║");
    println!("║    Lines: Orange / Silver / Blue                           ║");
    println!("║                                                            ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");

    let api_key = match WmataModels::api_key() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("❌ {}", e);
            eprintln!("Server cannot start without a WMATA API key.");
            std::process::exit(1);
        }
    };

    println!("📡 Initializing Metrorail data cache...");
    println!("   This includes the static rail schedule and both live feeds...\n");

    let cache = match WmataModels::initialize_cache(&api_key) {
        Ok(cache) => {
            println!("\n╔════════════════════════════════════════════════════════════╗");
            println!("║  ✅ Cache Initialized Successfully!                        ║");
            println!("╚════════════════════════════════════════════════════════════╝");
            cache
        }
        Err(e) => {
            eprintln!("\n╔════════════════════════════════════════════════════════════╗");
            eprintln!("║  ❌ INITIALIZATION FAILED                                  ║");
            eprintln!("╚════════════════════════════════════════════════════════════╝");
            eprintln!("\n❌ Failed to initialize cache: {}", e);
            eprintln!("Server cannot start without initial data.");
            eprintln!("\n💡 Troubleshooting:");
            eprintln!("   1. Check your internet connection");
            eprintln!("   2. Verify your WMATA_API_KEY is valid");
            eprintln!("   3. Check https://developer.wmata.com service status\n");
            std::process::exit(1);
        }
    };

    actix_web::rt::System::new().block_on(run_server(cache, api_key))
}

use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    Assumptions, ConversionStrategy, ProjectionError, ProjectionSummary, SimulationInput, TaxTable,
    YearlyProjectionRecord, run_many, run_with_assumptions, summarize,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error("no built-in tax table for {0}")]
    UnknownTaxYear(i32),
    #[error("cannot read assumptions file {}: {source}", path.display())]
    AssumptionsFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid assumptions: {0}")]
    AssumptionsFormat(#[source] serde_json::Error),
    #[error("Not found")]
    NotFound,
    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Encode(_) | ApiError::AssumptionsFile { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::InvalidInput(_)
            | ApiError::Projection(_)
            | ApiError::UnknownTaxYear(_)
            | ApiError::AssumptionsFormat(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(self.status(), &self.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectionPayload {
    current_age: Option<u32>,
    taxable_amount: Option<f64>,
    taxable_cost_basis: Option<f64>,
    ira_amount: Option<f64>,
    roth_amount: Option<f64>,
    conversion_amount: Option<f64>,
    front_load_conversions: Option<bool>,
    convert_after_rmd_age: Option<bool>,
    expected_growth_rate: Option<f64>,
    capital_gains_rate: Option<f64>,
    state_tax_rate: Option<f64>,
    conservative_buffer: Option<f64>,
    tax_year: Option<i32>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rothplan",
    about = "Year-by-year Roth conversion and multi-account tax projection"
)]
pub struct Cli {
    #[arg(long)]
    current_age: u32,
    #[arg(long)]
    taxable_amount: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Taxable account cost basis; defaults to taxable-amount"
    )]
    taxable_cost_basis: f64,
    #[arg(long, help = "Pre-tax IRA balance")]
    ira_amount: f64,
    #[arg(long, default_value_t = 0.0)]
    roth_amount: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual Roth conversion target")]
    conversion_amount: f64,
    #[arg(long, help = "Taper conversions from 1.5x the target down to 0.5x")]
    front_load_conversions: bool,
    #[arg(long, help = "Keep converting after required distributions begin")]
    convert_after_rmd_age: bool,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Expected annual growth in percent, e.g. 9"
    )]
    expected_growth_rate: f64,
    #[arg(
        long,
        default_value_t = 15.0,
        help = "Baseline capital gains rate in percent (informational)"
    )]
    capital_gains_rate: f64,
    #[arg(long, default_value_t = 5.0, help = "Flat state tax rate in percent")]
    state_tax_rate: f64,
    #[arg(
        long,
        default_value_t = 1.2,
        help = "Multiplier applied to reported tax, >= 1.0"
    )]
    conservative_buffer: f64,
    #[arg(long, help = "Base tax year for the bracket table (2024 or 2025)")]
    tax_year: Option<i32>,
    #[arg(long, help = "JSON file overriding the built-in assumptions")]
    assumptions_file: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionResponse {
    tax_year: i32,
    strategy: ConversionStrategy,
    records: Vec<YearlyProjectionRecord>,
    summary: ProjectionSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompareResponse {
    steady: ProjectionResponse,
    front_loaded: ProjectionResponse,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_inputs(cli: &Cli) -> Result<SimulationInput, ApiError> {
    for (name, rate) in [
        ("--capital-gains-rate", cli.capital_gains_rate),
        ("--state-tax-rate", cli.state_tax_rate),
    ] {
        if !(0.0..=100.0).contains(&rate) {
            return Err(ApiError::InvalidInput(format!(
                "{name} must be between 0 and 100"
            )));
        }
    }

    if !cli.expected_growth_rate.is_finite() || cli.expected_growth_rate < -100.0 {
        return Err(ApiError::InvalidInput(
            "--expected-growth-rate must be >= -100".to_string(),
        ));
    }

    let taxable_cost_basis = if cli.taxable_cost_basis == 0.0 {
        cli.taxable_amount
    } else {
        cli.taxable_cost_basis
    };

    let input = SimulationInput {
        current_age: cli.current_age,
        taxable_balance: cli.taxable_amount,
        taxable_cost_basis,
        pretax_balance: cli.ira_amount,
        roth_balance: cli.roth_amount,
        conversion_target: cli.conversion_amount,
        strategy: ConversionStrategy::from_front_load_flag(cli.front_load_conversions),
        convert_after_rmd_age: cli.convert_after_rmd_age,
        growth_rate: cli.expected_growth_rate / 100.0,
        capital_gains_baseline_rate: cli.capital_gains_rate / 100.0,
        state_tax_rate: cli.state_tax_rate / 100.0,
        conservative_buffer: cli.conservative_buffer,
    };
    input.validate()?;
    Ok(input)
}

fn resolve_assumptions(
    tax_year: Option<i32>,
    assumptions_file: Option<&Path>,
) -> Result<Assumptions, ApiError> {
    let mut assumptions = match assumptions_file {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|source| ApiError::AssumptionsFile {
                path: path.to_path_buf(),
                source,
            })?;
            Assumptions::from_json(&json).map_err(ApiError::AssumptionsFormat)?
        }
        None => Assumptions::default(),
    };
    if let Some(year) = tax_year {
        assumptions.tax_table = TaxTable::for_tax_year(year).ok_or(ApiError::UnknownTaxYear(year))?;
    }
    Ok(assumptions)
}

fn project(
    input: &SimulationInput,
    assumptions: &Assumptions,
) -> Result<ProjectionResponse, ApiError> {
    let records = run_with_assumptions(input, assumptions)?;
    Ok(projection_response(input.strategy, assumptions, records))
}

fn projection_response(
    strategy: ConversionStrategy,
    assumptions: &Assumptions,
    records: Vec<YearlyProjectionRecord>,
) -> ProjectionResponse {
    ProjectionResponse {
        tax_year: assumptions.tax_table.tax_year,
        strategy,
        summary: summarize(&records),
        records,
    }
}

fn compare(input: &SimulationInput, assumptions: &Assumptions) -> Result<CompareResponse, ApiError> {
    let strategies = [ConversionStrategy::Steady, ConversionStrategy::FrontLoaded];
    let inputs = strategies.map(|strategy| SimulationInput {
        strategy,
        ..input.clone()
    });
    let [steady, front_loaded]: [Result<_, _>; 2] = run_many(&inputs, assumptions)
        .try_into()
        .map_err(|_| ApiError::InvalidInput("comparison needs both strategies".to_string()))?;
    Ok(CompareResponse {
        steady: projection_response(strategies[0], assumptions, steady?),
        front_loaded: projection_response(strategies[1], assumptions, front_loaded?),
    })
}

/// One-shot CLI projection rendered as pretty JSON.
pub fn run_cli(cli: &Cli) -> Result<String, ApiError> {
    let input = build_inputs(cli)?;
    let assumptions = resolve_assumptions(cli.tax_year, cli.assumptions_file.as_deref())?;
    let response = project(&input, &assumptions)?;
    serde_json::to_string_pretty(&response).map_err(ApiError::Encode)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/projection",
            get(projection_get_handler).post(projection_post_handler),
        )
        .route(
            "/api/compare",
            get(compare_get_handler).post(compare_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "rothplan HTTP API listening");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    ApiError::NotFound.into_response()
}

async fn projection_get_handler(Query(payload): Query<ProjectionPayload>) -> Response {
    projection_handler_impl(payload).await
}

async fn projection_post_handler(Json(payload): Json<ProjectionPayload>) -> Response {
    projection_handler_impl(payload).await
}

async fn projection_handler_impl(payload: ProjectionPayload) -> Response {
    let result = api_request_from_payload(payload).and_then(|(input, assumptions)| {
        info!(
            current_age = input.current_age,
            strategy = ?input.strategy,
            tax_year = assumptions.tax_table.tax_year,
            "projection request"
        );
        project(&input, &assumptions)
    });
    match result {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => err.into_response(),
    }
}

async fn compare_get_handler(Query(payload): Query<ProjectionPayload>) -> Response {
    compare_handler_impl(payload).await
}

async fn compare_post_handler(Json(payload): Json<ProjectionPayload>) -> Response {
    compare_handler_impl(payload).await
}

async fn compare_handler_impl(payload: ProjectionPayload) -> Response {
    let result = api_request_from_payload(payload).and_then(|(input, assumptions)| {
        info!(current_age = input.current_age, "strategy comparison request");
        compare(&input, &assumptions)
    });
    match result {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => err.into_response(),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<(SimulationInput, Assumptions), ApiError> {
    let payload = serde_json::from_str::<ProjectionPayload>(json)
        .map_err(|e| ApiError::InvalidInput(format!("Invalid API JSON payload: {e}")))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(
    payload: ProjectionPayload,
) -> Result<(SimulationInput, Assumptions), ApiError> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.taxable_amount {
        cli.taxable_amount = v;
        // A new balance without an explicit basis carries no embedded gain.
        cli.taxable_cost_basis = 0.0;
    }
    if let Some(v) = payload.taxable_cost_basis {
        cli.taxable_cost_basis = v;
    }
    if let Some(v) = payload.ira_amount {
        cli.ira_amount = v;
    }
    if let Some(v) = payload.roth_amount {
        cli.roth_amount = v;
    }
    if let Some(v) = payload.conversion_amount {
        cli.conversion_amount = v;
    }
    if let Some(v) = payload.front_load_conversions {
        cli.front_load_conversions = v;
    }
    if let Some(v) = payload.convert_after_rmd_age {
        cli.convert_after_rmd_age = v;
    }
    if let Some(v) = payload.expected_growth_rate {
        cli.expected_growth_rate = v;
    }
    if let Some(v) = payload.capital_gains_rate {
        cli.capital_gains_rate = v;
    }
    if let Some(v) = payload.state_tax_rate {
        cli.state_tax_rate = v;
    }
    if let Some(v) = payload.conservative_buffer {
        cli.conservative_buffer = v;
    }
    if payload.tax_year.is_some() {
        cli.tax_year = payload.tax_year;
    }

    let input = build_inputs(&cli)?;
    let assumptions = resolve_assumptions(cli.tax_year, None)?;
    Ok((input, assumptions))
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 60,
        taxable_amount: 8_500_000.0,
        taxable_cost_basis: 0.0,
        ira_amount: 4_100_000.0,
        roth_amount: 0.0,
        conversion_amount: 250_000.0,
        front_load_conversions: false,
        convert_after_rmd_age: false,
        expected_growth_rate: 9.0,
        capital_gains_rate: 15.0,
        state_tax_rate: 5.0,
        conservative_buffer: 1.2,
        tax_year: None,
        assumptions_file: None,
    }
}

// src/sheets.rs
//
// Google Sheets upload: service-account JWT bearer grant, then clear + rewrite
// one worksheet through the Sheets v4 REST API.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

use crate::{extract::ListingRecord, output::CSV_HEADER};

pub const SHEET_ID_ENV: &str = "GSHEET_ID";
pub const CREDENTIALS_ENV: &str = "GOOGLE_SERVICE_ACCOUNT_JSON";
/// Target worksheet ("listed/OTC").
pub const WORKSHEET: &str = "上市櫃";

const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];
const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("environment variable GSHEET_ID is not set")]
    MissingSheetId,
    #[error("service account credentials: {0}")]
    Credentials(String),
    #[error("signing service account assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("request to Google failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid Sheets URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Google API returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// The fields of a service-account key file that the JWT grant needs.
#[derive(Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

pub struct SheetConfig {
    pub sheet_id: String,
    pub key: ServiceAccountKey,
}

impl SheetConfig {
    /// Read `GSHEET_ID` and `GOOGLE_SERVICE_ACCOUNT_JSON`.
    pub fn from_env() -> Result<Self, SheetError> {
        Self::from_vars(env::var(SHEET_ID_ENV).ok(), env::var(CREDENTIALS_ENV).ok())
    }

    pub fn from_vars(
        sheet_id: Option<String>,
        credentials_json: Option<String>,
    ) -> Result<Self, SheetError> {
        let sheet_id = sheet_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(SheetError::MissingSheetId)?;
        let json = credentials_json
            .ok_or_else(|| SheetError::Credentials(format!("{CREDENTIALS_ENV} is not set")))?;
        let key: ServiceAccountKey = serde_json::from_str(&json)
            .map_err(|e| SheetError::Credentials(format!("parsing {CREDENTIALS_ENV}: {e}")))?;
        Ok(Self { sheet_id, key })
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange {
    major_dimension: &'static str,
    values: Vec<Vec<String>>,
}

pub struct SheetUploader {
    client: Client,
    config: SheetConfig,
}

impl SheetUploader {
    pub fn new(config: SheetConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Replace the contents of the worksheet with header + `records`, from A1.
    #[instrument(level = "info", skip_all, fields(rows = records.len()))]
    pub async fn upload(&self, records: &[ListingRecord]) -> Result<(), SheetError> {
        let token = self.access_token().await?;

        // 1) clear the whole worksheet
        let clear = values_url(&self.config.sheet_id, &a1_range(WORKSHEET, None), ":clear")?;
        send(
            self.client
                .post(clear)
                .bearer_auth(&token)
                .json(&serde_json::json!({})),
        )
        .await?;
        debug!(worksheet = WORKSHEET, "worksheet cleared");

        // 2) write everything starting at the top-left cell
        let mut update = values_url(&self.config.sheet_id, &a1_range(WORKSHEET, Some("A1")), "")?;
        update
            .query_pairs_mut()
            .append_pair("valueInputOption", "RAW");
        let body = ValueRange {
            major_dimension: "ROWS",
            values: sheet_values(records),
        };
        send(self.client.put(update).bearer_auth(&token).json(&body)).await?;

        info!(worksheet = WORKSHEET, "sheet updated");
        Ok(())
    }

    async fn access_token(&self) -> Result<String, SheetError> {
        let key = &self.config.key;
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &key.client_email,
            scope: SCOPES.join(" "),
            aud: &key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let assertion = encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &EncodingKey::from_rsa_pem(key.private_key.as_bytes())?,
        )?;

        let resp = send(self.client.post(&key.token_uri).form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ]))
        .await?;
        let token: TokenResponse = resp.json().await?;
        debug!(account = %key.client_email, "access token obtained");
        Ok(token.access_token)
    }
}

async fn send(req: RequestBuilder) -> Result<reqwest::Response, SheetError> {
    let resp = req.send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SheetError::Api {
        status: status.as_u16(),
        body,
    })
}

/// A1 notation for `sheet`, optionally narrowed to `cell`. Sheet names are
/// always quoted; embedded quotes are doubled.
pub fn a1_range(sheet: &str, cell: Option<&str>) -> String {
    let quoted = format!("'{}'", sheet.replace('\'', "''"));
    match cell {
        Some(cell) => format!("{quoted}!{cell}"),
        None => quoted,
    }
}

fn values_url(sheet_id: &str, range: &str, suffix: &str) -> Result<Url, SheetError> {
    Ok(Url::parse(&format!(
        "{SHEETS_API}/{sheet_id}/values/{range}{suffix}"
    ))?)
}

/// Header row followed by one row per record.
pub fn sheet_values(records: &[ListingRecord]) -> Vec<Vec<String>> {
    std::iter::once(CSV_HEADER.map(str::to_string).to_vec())
        .chain(
            records
                .iter()
                .map(|r| r.to_row().map(str::to_string).to_vec()),
        )
        .collect()
}

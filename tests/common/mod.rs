#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::StatusCode;

use crl_housekeeper::config::{CrlSource, ServerConfig};
use crl_housekeeper::housekeeping::{CrlFetch, FetchError, FetchResult};
use crl_housekeeper::server::{AppState, Server};

// ---------------------------------------------------------------------------
// Minimal DER builder for CertificateList structures. Enough of X.690 to
// produce CRLs the parser accepts: short and long form lengths, UTCTime,
// and arbitrary-precision serial INTEGERs.
// ---------------------------------------------------------------------------

fn wrap(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let len_bytes: Vec<u8> = len
            .to_be_bytes()
            .iter()
            .copied()
            .skip_while(|&b| b == 0)
            .collect();
        out.push(0x80 | len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
    out.extend_from_slice(content);
    out
}

fn sequence(content: &[u8]) -> Vec<u8> {
    wrap(0x30, content)
}

fn set(content: &[u8]) -> Vec<u8> {
    wrap(0x31, content)
}

/// INTEGER from a big-endian unsigned magnitude.
fn integer(magnitude: &[u8]) -> Vec<u8> {
    let mut bytes: Vec<u8> = magnitude.iter().copied().skip_while(|&b| b == 0).collect();
    if bytes.is_empty() {
        bytes.push(0);
    }
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    wrap(0x02, &bytes)
}

fn utc_time(at: DateTime<Utc>) -> Vec<u8> {
    wrap(0x17, at.format("%y%m%d%H%M%SZ").to_string().as_bytes())
}

fn bit_string(payload: &[u8]) -> Vec<u8> {
    let mut content = vec![0x00]; // no unused bits
    content.extend_from_slice(payload);
    wrap(0x03, &content)
}

/// AlgorithmIdentifier for sha256WithRSAEncryption (1.2.840.113549.1.1.11).
fn signature_algorithm() -> Vec<u8> {
    let oid = wrap(
        0x06,
        &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B],
    );
    let null = wrap(0x05, &[]);
    sequence(&[oid, null].concat())
}

/// `CN=<common_name>` as an X.501 Name.
fn issuer_name(common_name: &str) -> Vec<u8> {
    let cn_oid = wrap(0x06, &[0x55, 0x04, 0x03]);
    let value = wrap(0x0C, common_name.as_bytes());
    let attribute = sequence(&[cn_oid, value].concat());
    sequence(&set(&attribute))
}

/// Builds a syntactically valid, unsigned v2 CRL. `serials` are big-endian
/// unsigned magnitudes, revoked in the order given.
pub fn build_crl(
    this_update: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
    serials: &[&[u8]],
) -> Vec<u8> {
    let mut tbs = Vec::new();
    tbs.extend(integer(&[1])); // v2
    tbs.extend(signature_algorithm());
    tbs.extend(issuer_name("Housekeeper Test CA"));
    tbs.extend(utc_time(this_update));
    if let Some(next_update) = next_update {
        tbs.extend(utc_time(next_update));
    }
    if !serials.is_empty() {
        let mut revoked = Vec::new();
        for serial in serials {
            let entry = [integer(serial), utc_time(this_update)].concat();
            revoked.extend(sequence(&entry));
        }
        tbs.extend(sequence(&revoked));
    }

    let body = [sequence(&tbs), signature_algorithm(), bit_string(&[0xAA; 8])].concat();
    sequence(&body)
}

// ---------------------------------------------------------------------------
// Scripted fetcher: answers by source name, counting calls.
// ---------------------------------------------------------------------------

pub enum Scripted {
    Bytes(Vec<u8>),
    Timeout,
    Status(u16),
}

#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    responses: Arc<DashMap<String, Scripted>>,
    calls: Arc<DashMap<String, usize>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, name: &str, script: Scripted) -> Self {
        self.responses.insert(name.to_string(), script);
        self
    }

    /// Replaces the script for a name on an already-shared fetcher.
    pub fn set(&self, name: &str, script: Scripted) {
        self.responses.insert(name.to_string(), script);
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.get(name).map(|count| *count).unwrap_or(0)
    }
}

#[async_trait]
impl CrlFetch for ScriptedFetcher {
    async fn fetch(&self, source: &CrlSource) -> FetchResult<Vec<u8>> {
        *self.calls.entry(source.name.clone()).or_insert(0) += 1;
        let Some(script) = self.responses.get(source.name.as_str()) else {
            panic!("no script for source '{}'", source.name);
        };
        match &*script {
            Scripted::Bytes(bytes) => Ok(bytes.clone()),
            Scripted::Timeout => Err(FetchError::Timeout),
            Scripted::Status(code) => {
                let status = StatusCode::from_u16(*code).expect("valid status code");
                Err(FetchError::HttpStatus(status))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Status server on a random port.
// ---------------------------------------------------------------------------

pub async fn spawn_status_server(state: AppState) -> String {
    let config = ServerConfig {
        host: "localhost".to_string(),
        port: 0,
    };
    let server = Server::new(state, &config).await.unwrap();
    let port = server.port().unwrap();
    tokio::spawn(async move {
        server.run().await.expect("failed to run status server");
    });
    format!("http://{}:{}", config.host, port)
}

pub fn source(name: &str, enabled: bool) -> CrlSource {
    CrlSource {
        name: name.to_string(),
        url: format!("https://pki.example.org/{name}.crl"),
        enabled,
    }
}

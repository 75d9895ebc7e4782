//! Registry backends.
//!
//! Each provider performs a single call and normalizes its own schema into a
//! [`RegistryRecord`]. Retries, fallback and caching belong to the orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::registry::types::{
    parse_provider_date, ProviderAnswer, ProviderKind, RegistryNumber, RegistryRecord, Situation,
};
use crate::transport::types::{ErrorKind, IntegrationRequest, TransportError};
use crate::transport::HttpTransport;

const INTEGRATION: &str = "registry";

/// A registry backend.
#[async_trait]
pub trait RegistryProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Look up one identifier. `Ok(NoData)` is a clean negative, not an error.
    async fn fetch(&self, number: &RegistryNumber) -> Result<ProviderAnswer, TransportError>;
}

// --- Accelerator ---

/// Accelerator response envelope. `code` mirrors HTTP semantics inside a 200.
#[derive(Debug, Deserialize)]
struct AcceleratorEnvelope {
    code: u16,
    #[serde(default)]
    code_message: Option<String>,
    #[serde(default)]
    data: Vec<AcceleratorRecord>,
}

#[derive(Debug, Deserialize)]
struct AcceleratorRecord {
    #[serde(default)]
    nome_produto: Option<String>,
    #[serde(default)]
    detentor: Option<String>,
    #[serde(default)]
    situacao: Option<String>,
    #[serde(default)]
    vencimento: Option<String>,
    #[serde(default)]
    classe_risco: Option<String>,
}

/// Envelope codes meaning "the source has nothing for this identifier".
const ACCELERATOR_NO_DATA: &[u16] = &[404, 612];
/// Envelope codes meaning the upstream source itself failed or timed out.
const ACCELERATOR_UPSTREAM_FAILURE: &[u16] = &[605, 609, 615];

/// Paid accelerator backend.
pub struct AcceleratorProvider {
    transport: HttpTransport,
    base_url: String,
    api_key: String,
    timeout: Option<Duration>,
}

impl AcceleratorProvider {
    pub fn new(
        transport: HttpTransport,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        }
    }

    fn normalize(&self, endpoint: &str, envelope: AcceleratorEnvelope) -> Result<ProviderAnswer, TransportError> {
        let message = envelope.code_message.unwrap_or_default();
        match envelope.code {
            200 => Ok(envelope
                .data
                .into_iter()
                .next()
                .map(|r| {
                    ProviderAnswer::Found(RegistryRecord {
                        situation: r.situacao.as_deref().map(Situation::from_label),
                        product_name: r.nome_produto,
                        holder_name: r.detentor,
                        expires_on: r.vencimento.as_deref().and_then(parse_provider_date),
                        risk_class: r.classe_risco,
                    })
                })
                .unwrap_or(ProviderAnswer::NoData)),
            code if ACCELERATOR_NO_DATA.contains(&code) => Ok(ProviderAnswer::NoData),
            code if ACCELERATOR_UPSTREAM_FAILURE.contains(&code) => Err(TransportError::Server {
                endpoint: endpoint.to_string(),
                status: 502,
                message: format!("accelerator code {}: {}", code, message),
            }),
            code => Err(TransportError::Client {
                endpoint: endpoint.to_string(),
                status: 400,
                message: format!("accelerator code {}: {}", code, message),
            }),
        }
    }
}

#[async_trait]
impl RegistryProvider for AcceleratorProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Accelerator
    }

    async fn fetch(&self, number: &RegistryNumber) -> Result<ProviderAnswer, TransportError> {
        let mut request = IntegrationRequest::get(
            INTEGRATION,
            format!("{}/consultas/anvisa/registro", self.base_url),
        )
        .query("token", self.api_key.as_str())
        .query("registro", number.as_str());
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let endpoint = request.endpoint();
        let envelope: AcceleratorEnvelope = self.transport.execute(&request).await?.into_json(&endpoint)?;
        self.normalize(&endpoint, envelope)
    }
}

// --- Public registry ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicRecord {
    #[serde(default)]
    numero_registro: Option<String>,
    #[serde(default)]
    nome_produto: Option<String>,
    #[serde(default)]
    razao_social: Option<String>,
    #[serde(default)]
    situacao: Option<String>,
    #[serde(default)]
    data_vencimento: Option<String>,
    #[serde(default)]
    classe_risco: Option<String>,
}

/// Public registry backend.
pub struct PublicRegistryProvider {
    transport: HttpTransport,
    base_url: String,
    timeout: Option<Duration>,
}

impl PublicRegistryProvider {
    pub fn new(transport: HttpTransport, base_url: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl RegistryProvider for PublicRegistryProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::PublicRegistry
    }

    async fn fetch(&self, number: &RegistryNumber) -> Result<ProviderAnswer, TransportError> {
        let mut request = IntegrationRequest::get(
            INTEGRATION,
            format!("{}/registros/{}", self.base_url, number),
        );
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let endpoint = request.endpoint();

        let payload = match self.transport.execute(&request).await {
            Ok(payload) => payload,
            Err(e) if e.kind() == ErrorKind::Client && e.status() == Some(404) => {
                return Ok(ProviderAnswer::NoData)
            }
            Err(e) => return Err(e),
        };

        if payload.is_empty() {
            return Ok(ProviderAnswer::NoData);
        }

        let record: PublicRecord = payload.into_json(&endpoint)?;
        if record.numero_registro.is_none() && record.nome_produto.is_none() {
            return Ok(ProviderAnswer::NoData);
        }

        Ok(ProviderAnswer::Found(RegistryRecord {
            situation: record.situacao.as_deref().map(Situation::from_label),
            product_name: record.nome_produto,
            holder_name: record.razao_social,
            expires_on: record.data_vencimento.as_deref().and_then(parse_provider_date),
            risk_class: record.classe_risco,
        }))
    }
}

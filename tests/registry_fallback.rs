//! Registry lookups against mocked accelerator and public registry.

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use integration_gateway::registry::{ProviderKind, RegistryLookup, Situation};
use integration_gateway::GatewayConfig;

mod common;

const NORMALIZED: &str = "1012345678901";

struct Authorities {
    accelerator: MockServer,
    public: MockServer,
}

async fn authorities() -> Authorities {
    Authorities {
        accelerator: MockServer::start().await,
        public: MockServer::start().await,
    }
}

fn config(authorities: &Authorities, with_accelerator: bool) -> GatewayConfig {
    let mut config = common::fast_config();
    config.registry.enabled = true;
    config.registry.accelerator_url = authorities.accelerator.uri();
    config.registry.public_url = authorities.public.uri();
    config.registry.timeout_ms = Some(1_000);
    if with_accelerator {
        config.registry.accelerator_api_key = Some("accel-token".into());
    }
    config
}

fn lookup(config: &GatewayConfig) -> RegistryLookup {
    RegistryLookup::from_config(config, common::transport())
}

fn public_record() -> serde_json::Value {
    json!({
        "numeroRegistro": NORMALIZED,
        "nomeProduto": "Cateter Venoso",
        "razaoSocial": "Hospitalar SA",
        "situacao": "Válido",
        "dataVencimento": "2099-12-31",
        "classeRisco": "III"
    })
}

#[tokio::test]
async fn test_accelerator_answer_is_cached() {
    let authorities = authorities().await;
    Mock::given(method("GET"))
        .and(path("/consultas/anvisa/registro"))
        .and(query_param("token", "accel-token"))
        .and(query_param("registro", NORMALIZED))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "code_message": "OK",
            "data": [{
                "nome_produto": "Luva Cirurgica",
                "detentor": "ACME Ltda",
                "situacao": "ATIVO",
                "vencimento": "31/12/2099",
                "classe_risco": "II"
            }]
        })))
        .expect(1)
        .mount(&authorities.accelerator)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&authorities.public)
        .await;

    let lookup = lookup(&config(&authorities, true));
    // Fourteen digits once separators are stripped: rejected without a call.
    let rejected = lookup.lookup("1.0123.4567.8901-2").await.unwrap();
    assert!(!rejected.valid);
    assert_eq!(rejected.situation, Situation::InvalidFormat);
    assert_eq!(rejected.provider, ProviderKind::Local);

    let result = lookup.lookup("10.1234.5678.901").await.unwrap();
    assert!(result.valid);
    assert_eq!(result.identifier, NORMALIZED);
    assert_eq!(result.situation, Situation::Active);
    assert_eq!(result.provider, ProviderKind::Accelerator);
    assert_eq!(result.holder_name.as_deref(), Some("ACME Ltda"));

    let again = lookup.lookup(NORMALIZED).await.unwrap();
    assert_eq!(again, result);
}

#[tokio::test]
async fn test_falls_back_to_public_registry_on_no_data() {
    let authorities = authorities().await;
    Mock::given(method("GET"))
        .and(path("/consultas/anvisa/registro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 612,
            "code_message": "Nenhum resultado",
            "data": []
        })))
        .expect(1)
        .mount(&authorities.accelerator)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/registros/{}", NORMALIZED)))
        .respond_with(ResponseTemplate::new(200).set_body_json(public_record()))
        .expect(1)
        .mount(&authorities.public)
        .await;

    let result = lookup(&config(&authorities, true)).lookup(NORMALIZED).await.unwrap();
    assert!(result.valid);
    assert_eq!(result.provider, ProviderKind::PublicRegistry);
    assert_eq!(result.product_name.as_deref(), Some("Cateter Venoso"));
    assert_eq!(result.risk_class.as_deref(), Some("III"));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let authorities = authorities().await;
    Mock::given(method("GET"))
        .and(path(format!("/registros/{}", NORMALIZED)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&authorities.public)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/registros/{}", NORMALIZED)))
        .respond_with(ResponseTemplate::new(200).set_body_json(public_record()))
        .expect(1)
        .mount(&authorities.public)
        .await;

    let result = lookup(&config(&authorities, false)).lookup(NORMALIZED).await.unwrap();
    assert!(result.valid);
}

#[tokio::test]
async fn test_outage_does_not_fall_back_and_is_not_cached() {
    let authorities = authorities().await;
    Mock::given(method("GET"))
        .and(path("/consultas/anvisa/registro"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&authorities.accelerator)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(public_record()))
        .expect(0)
        .mount(&authorities.public)
        .await;

    let lookup = lookup(&config(&authorities, true));
    let err = lookup.lookup(NORMALIZED).await.unwrap_err();
    assert!(err.is_unavailable());
    assert!(lookup.cache().is_empty());

    let requests = authorities.accelerator.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_not_found_is_a_negative_result() {
    let authorities = authorities().await;
    Mock::given(method("GET"))
        .and(path(format!("/registros/{}", NORMALIZED)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&authorities.public)
        .await;

    let lookup = lookup(&config(&authorities, false));
    let result = lookup.lookup(NORMALIZED).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.situation, Situation::NotFound);

    // Served from the negative cache.
    let again = lookup.lookup(NORMALIZED).await.unwrap();
    assert_eq!(again.situation, Situation::NotFound);
}

#[tokio::test]
async fn test_batch_lookup_settles_every_identifier() {
    let authorities = authorities().await;
    Mock::given(method("GET"))
        .and(path(format!("/registros/{}", NORMALIZED)))
        .respond_with(ResponseTemplate::new(200).set_body_json(public_record()))
        .expect(1)
        .mount(&authorities.public)
        .await;
    Mock::given(method("GET"))
        .and(path("/registros/1099999999999"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&authorities.public)
        .await;

    let lookup = lookup(&config(&authorities, false));
    let outcome = lookup
        .lookup_many([NORMALIZED, "1099999999999", "not-a-number", NORMALIZED])
        .await;

    assert_eq!(outcome.len(), 3);
    assert_eq!(outcome.succeeded(), 2);
    assert_eq!(outcome.failed(), 1);
    assert!(outcome.get(&NORMALIZED.to_string()).unwrap().as_ref().unwrap().valid);
    let invalid = outcome.get(&"not-a-number".to_string()).unwrap().as_ref().unwrap();
    assert_eq!(invalid.situation, Situation::InvalidFormat);
    assert!(outcome.get(&"1099999999999".to_string()).unwrap().is_err());
}

//! Wire types for the subscriber directory and the typed projection from
//! its nested response shape onto flat spreadsheet columns.
//!
//! Field names are ours; `#[serde(rename)]` binds them to the upstream
//! schema. Every level of the nesting is optional — a missing link
//! anywhere in the person → street → neighborhood → city → state chain
//! degrades to empty output fields, never to an error.

use serde::Deserialize;

/// Enrichment column headers, in output order.
pub const ENRICHMENT_COLUMNS: [&str; 12] = [
    "name",
    "tax_id",
    "email",
    "phone_primary",
    "phone_secondary",
    "postal_code",
    "street_number",
    "address_complement",
    "street",
    "neighborhood",
    "city",
    "state_code",
];

/// Top-level response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Option<ResponseData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseData {
    #[serde(default)]
    pub mk01: Option<Directory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Directory {
    #[serde(rename = "mk_conexoes", default)]
    pub connections: Vec<Connection>,
}

impl QueryResponse {
    /// Connections reachable through the expected nested path; empty when
    /// any level is absent.
    pub fn into_connections(self) -> Vec<Connection> {
        self.data
            .and_then(|d| d.mk01)
            .map(|dir| dir.connections)
            .unwrap_or_default()
    }
}

/// One subscriber connection returned for an identifier filter.
#[derive(Debug, Clone, Deserialize)]
pub struct Connection {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "mk_pessoa", default)]
    pub person: Option<Person>,
    #[serde(rename = "mk_logradouros", default)]
    pub street: Option<StreetRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Person {
    #[serde(rename = "nome_razaosocial")]
    pub name: Option<String>,
    #[serde(rename = "cpf")]
    pub tax_id: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "fone01")]
    pub phone_primary: Option<String>,
    #[serde(rename = "fone02")]
    pub phone_secondary: Option<String>,
    #[serde(rename = "cep")]
    pub postal_code: Option<String>,
    #[serde(rename = "numero")]
    pub street_number: Option<String>,
    #[serde(rename = "complementoendereco")]
    pub address_complement: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreetRecord {
    #[serde(rename = "logradouro")]
    pub street: Option<String>,
    #[serde(rename = "mk_bairros", default)]
    pub neighborhood: Option<Neighborhood>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Neighborhood {
    #[serde(rename = "bairro")]
    pub name: Option<String>,
    #[serde(rename = "mk_cidades", default)]
    pub city: Option<City>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct City {
    #[serde(rename = "cidade")]
    pub name: Option<String>,
    #[serde(rename = "mk_estado", default)]
    pub state: Option<State>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct State {
    #[serde(rename = "siglaestado")]
    pub code: Option<String>,
}

/// Flattened enrichment output for one row, in [`ENRICHMENT_COLUMNS`]
/// order. Absent data is the empty string, never a missing cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedFields {
    pub name: String,
    pub tax_id: String,
    pub email: String,
    pub phone_primary: String,
    pub phone_secondary: String,
    pub postal_code: String,
    pub street_number: String,
    pub address_complement: String,
    pub street: String,
    pub neighborhood: String,
    pub city: String,
    pub state_code: String,
}

impl EnrichedFields {
    pub fn into_values(self) -> [String; 12] {
        [
            self.name,
            self.tax_id,
            self.email,
            self.phone_primary,
            self.phone_secondary,
            self.postal_code,
            self.street_number,
            self.address_complement,
            self.street,
            self.neighborhood,
            self.city,
            self.state_code,
        ]
    }
}

impl Connection {
    /// Project the nested record onto flat columns.
    pub fn project(&self) -> EnrichedFields {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();

        let person = self.person.clone().unwrap_or_default();
        let street = self.street.clone().unwrap_or_default();
        let neighborhood = street.neighborhood.clone().unwrap_or_default();
        let city = neighborhood.city.clone().unwrap_or_default();
        let state = city.state.clone().unwrap_or_default();

        EnrichedFields {
            name: text(&person.name),
            tax_id: text(&person.tax_id),
            email: text(&person.email),
            phone_primary: text(&person.phone_primary),
            phone_secondary: text(&person.phone_secondary),
            postal_code: text(&person.postal_code),
            street_number: text(&person.street_number),
            address_complement: text(&person.address_complement),
            street: text(&street.street),
            neighborhood: text(&neighborhood.name),
            city: text(&city.name),
            state_code: text(&state.code),
        }
    }
}

/// Build the single-identifier query document for the directory.
pub fn connection_query(username: &str) -> String {
    format!(
        r#"query ConnectionLookup {{
  mk01 {{
    mk_conexoes(where: {{username: {{_eq: "{u}"}}}}) {{
      username
      mk_pessoa {{
        nome_razaosocial
        cpf
        email
        fone01
        fone02
        cep
        numero
        complementoendereco
      }}
      mk_logradouros {{
        logradouro
        mk_bairros {{
          bairro
          mk_cidades {{
            cidade
            mk_estado {{
              siglaestado
            }}
          }}
        }}
      }}
    }}
  }}
}}"#,
        u = graphql_escape(username)
    )
}

/// Escape a value for embedding in a GraphQL string literal.
fn graphql_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_response() -> &'static str {
        r#"{
            "data": {
                "mk01": {
                    "mk_conexoes": [{
                        "username": "alice",
                        "mk_pessoa": {
                            "nome_razaosocial": "Alice Andrade",
                            "cpf": "123.456.789-00",
                            "email": "alice@example.com",
                            "fone01": "11 91234-5678",
                            "fone02": null,
                            "cep": "01310-100",
                            "numero": "1578",
                            "complementoendereco": "ap 42"
                        },
                        "mk_logradouros": {
                            "logradouro": "Avenida Paulista",
                            "mk_bairros": {
                                "bairro": "Bela Vista",
                                "mk_cidades": {
                                    "cidade": "São Paulo",
                                    "mk_estado": { "siglaestado": "SP" }
                                }
                            }
                        }
                    }]
                }
            }
        }"#
    }

    #[test]
    fn projects_the_full_nested_chain() {
        let resp: QueryResponse = serde_json::from_str(full_response()).unwrap();
        let connections = resp.into_connections();
        assert_eq!(connections.len(), 1);

        let fields = connections[0].project();
        assert_eq!(fields.name, "Alice Andrade");
        assert_eq!(fields.tax_id, "123.456.789-00");
        assert_eq!(fields.phone_secondary, "");
        assert_eq!(fields.street, "Avenida Paulista");
        assert_eq!(fields.neighborhood, "Bela Vista");
        assert_eq!(fields.city, "São Paulo");
        assert_eq!(fields.state_code, "SP");
    }

    #[test]
    fn missing_person_degrades_to_empty_fields() {
        let resp: QueryResponse = serde_json::from_str(
            r#"{"data": {"mk01": {"mk_conexoes": [{"username": "bob"}]}}}"#,
        )
        .unwrap();
        let fields = resp.into_connections()[0].project();
        assert_eq!(fields, EnrichedFields::default());
    }

    #[test]
    fn broken_address_chain_keeps_person_fields() {
        let resp: QueryResponse = serde_json::from_str(
            r#"{"data": {"mk01": {"mk_conexoes": [{
                "username": "bob",
                "mk_pessoa": {"nome_razaosocial": "Bob"},
                "mk_logradouros": {"logradouro": "Rua A"}
            }]}}}"#,
        )
        .unwrap();
        let fields = resp.into_connections()[0].project();
        assert_eq!(fields.name, "Bob");
        assert_eq!(fields.street, "Rua A");
        assert_eq!(fields.neighborhood, "");
        assert_eq!(fields.state_code, "");
    }

    #[test]
    fn unreachable_path_yields_no_connections() {
        for body in [r#"{}"#, r#"{"data": null}"#, r#"{"data": {"mk01": null}}"#] {
            let resp: QueryResponse = serde_json::from_str(body).unwrap();
            assert!(resp.into_connections().is_empty(), "body: {body}");
        }
    }

    #[test]
    fn query_embeds_and_escapes_the_identifier() {
        let q = connection_query(r#"ali"ce"#);
        assert!(q.contains(r#"{_eq: "ali\"ce"}"#));
        assert!(q.contains("mk_conexoes"));
        assert!(q.contains("siglaestado"));
    }

    #[test]
    fn column_order_matches_projection_order() {
        let fields = EnrichedFields {
            name: "n".into(),
            state_code: "uf".into(),
            ..Default::default()
        };
        let values = fields.into_values();
        assert_eq!(ENRICHMENT_COLUMNS.len(), values.len());
        assert_eq!(values[0], "n");
        assert_eq!(values[11], "uf");
    }
}

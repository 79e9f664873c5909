// Async HTTP client for the catalog admin REST API.
//
// Base path: /api/
// Auth: optional bearer token (see `TransportConfig`)
// Envelope: { success, data, error, details }

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::envelope::{self, ApiEnvelope};
use crate::{Error, TransportConfig};

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the catalog REST API.
///
/// Entity-agnostic: every call takes the pluralized collection name
/// (`"products"`, `"brands"`, ...) and deserializes into the caller's type.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: Url,
}

impl CatalogClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from a base URL and transport config.
    ///
    /// `base_url` may point at the host (`https://shop.example`) or at the
    /// API root (`https://shop.example/api`); both resolve to `/api/`.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::from_reqwest(base_url, http)
    }

    /// Wrap an existing `reqwest::Client` (caller manages headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self { http, base_url })
    }

    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();

        if path.ends_with("/api") {
            url.set_path(&format!("{path}/"));
        } else {
            url.set_path(&format!("{path}/api/"));
        }

        Ok(url)
    }

    /// The resolved API root (always ends with `/api/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Append path segments onto the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() {
            ApiEnvelope::parse_data(&body)
        } else {
            Err(envelope::error_from_status(status.as_u16(), body))
        }
    }

    async fn handle_ack(resp: reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() {
            envelope::parse_ack(&body)
        } else {
            Err(envelope::error_from_status(status.as_u16(), body))
        }
    }

    // ━━ Public API ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// `GET /api/{collection}` with optional query filters.
    pub async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        params: &[(String, String)],
    ) -> Result<Vec<T>, Error> {
        let url = self.url(&[collection])?;
        debug!("GET {url} params={params:?}");

        let resp = self.http.get(url).query(params).send().await?;
        Self::handle_response(resp).await
    }

    /// `GET /api/{collection}/{id}`
    pub async fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<T, Error> {
        let url = self.url(&[collection, id])?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        Self::handle_response(resp).await
    }

    /// `POST /api/{collection}`
    pub async fn create<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        collection: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(&[collection])?;
        debug!("POST {url}");

        let resp = self.http.post(url).json(body).send().await?;
        Self::handle_response(resp).await
    }

    /// `PATCH /api/{collection}/{id}`
    pub async fn update<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(&[collection, id])?;
        debug!("PATCH {url}");

        let resp = self.http.patch(url).json(body).send().await?;
        Self::handle_response(resp).await
    }

    /// `DELETE /api/{collection}/{id}`
    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), Error> {
        let url = self.url(&[collection, id])?;
        debug!("DELETE {url}");

        let resp = self.http.delete(url).send().await?;
        Self::handle_ack(resp).await
    }

    /// `POST /api/{collection}/{id}/sync`: push to the external platform.
    ///
    /// Single request/response; the server blocks until the sync settles.
    pub async fn sync<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<T, Error> {
        let url = self.url(&[collection, id, "sync"])?;
        debug!("POST {url}");

        let resp = self
            .http
            .post(url)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::handle_response(resp).await
    }

    // ── Image sub-resources ──────────────────────────────────────────

    /// `POST /api/{collection}/{id}/images` (multipart, field `image`).
    pub async fn upload_image<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<T, Error> {
        let url = self.url(&[collection, id, "images"])?;
        debug!("POST {url} file={file_name} size={}", bytes.len());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_owned())
            .mime_str(content_type)?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let resp = self.http.post(url).multipart(form).send().await?;
        Self::handle_response(resp).await
    }

    /// `DELETE /api/{collection}/{id}/images/{image_id}`
    pub async fn delete_image<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        image_id: &str,
    ) -> Result<T, Error> {
        let url = self.url(&[collection, id, "images", image_id])?;
        debug!("DELETE {url}");

        let resp = self.http.delete(url).send().await?;
        Self::handle_response(resp).await
    }

    /// `PUT /api/{collection}/{id}/images/order`
    pub async fn reorder_images<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        image_ids: &[String],
    ) -> Result<T, Error> {
        #[derive(Serialize)]
        struct Body<'a> {
            order: &'a [String],
        }

        let url = self.url(&[collection, id, "images", "order"])?;
        debug!("PUT {url}");

        let resp = self
            .http
            .put(url)
            .json(&Body { order: image_ids })
            .send()
            .await?;
        Self::handle_response(resp).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> CatalogClient {
        CatalogClient::from_reqwest(base, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn base_url_gets_api_suffix() {
        assert_eq!(client("https://shop.example").base_url().as_str(), "https://shop.example/api/");
        assert_eq!(
            client("https://shop.example/admin/").base_url().as_str(),
            "https://shop.example/admin/api/"
        );
    }

    #[test]
    fn base_url_keeps_existing_api_suffix() {
        assert_eq!(
            client("https://shop.example/api").base_url().as_str(),
            "https://shop.example/api/"
        );
    }

    #[test]
    fn url_segments_are_encoded() {
        let c = client("https://shop.example");
        let url = c.url(&["brands", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "https://shop.example/api/brands/a%20b%2Fc");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            CatalogClient::from_reqwest("not a url", reqwest::Client::new()),
            Err(Error::InvalidUrl(_))
        ));
    }
}

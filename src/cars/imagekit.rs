//! Direct HTTP upload to the image host. The file goes up base64-encoded in
//! a form-urlencoded body with Basic auth over the private key; the hosted
//! URL comes back in the response JSON.

use base64::prelude::*;
use serde::Deserialize;

#[derive(Clone)]
pub struct ImageKit {
    upload_url: String,
    private_key: String,
    folder: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: Option<String>,
    message: Option<String>,
}

impl ImageKit {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            upload_url: dotenv::var("IMAGEKIT_UPLOAD_URL")
                .unwrap_or_else(|_| "https://upload.imagekit.io".to_owned()),
            private_key: dotenv::var("IMAGEKIT_PRIVATE_KEY")?,
            folder: dotenv::var("IMAGEKIT_FOLDER").unwrap_or_else(|_| "car-app-uploads".to_owned()),
            http: reqwest::Client::new(),
        })
    }

    /// Uploads one image and returns its hosted URL.
    pub async fn upload(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<String> {
        let auth = BASE64_STANDARD.encode(format!("{}:", self.private_key));
        let millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let form = [
            ("file", BASE64_STANDARD.encode(bytes)),
            ("fileName", format!("{millis}-{file_name}")),
            ("folder", self.folder.clone()),
        ];

        let response = self
            .http
            .post(format!("{}/api/v1/files/upload", self.upload_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Basic {auth}"),
            )
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body: UploadResponse = response.json().await?;
        if !status.is_success() {
            anyhow::bail!(
                "image host rejected the upload ({status}): {}",
                body.message.unwrap_or_default()
            );
        }

        body.url
            .ok_or_else(|| anyhow::anyhow!("image host response carried no url"))
    }
}

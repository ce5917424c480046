use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::ImageFormat;
use url::Url;

use super::ImageFetcher;

pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client) -> Self { Self { client } }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str, scale: Option<f32>) -> Result<Bytes> {
        let parsed = Url::parse(url.trim()).with_context(|| format!("invalid image URL: {url:?}"))?;
        let bytes = self
            .client
            .get(parsed)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?
            .bytes()
            .await
            .with_context(|| format!("reading body of {url}"))?;
        match scale {
            Some(factor) => tokio::task::spawn_blocking(move || scale_to_jpeg(&bytes, factor))
                .await
                .map_err(|e| anyhow!("scaling task failed: {e}"))?,
            None => Ok(bytes),
        }
    }
}

/// Resize by `factor` and re-encode as JPEG.
pub fn scale_to_jpeg(raw: &[u8], factor: f32) -> Result<Bytes> {
    let img = image::load_from_memory(raw).context("decoding image")?;
    let width = ((img.width() as f32) * factor).round().max(1.0) as u32;
    let height = ((img.height() as f32) * factor).round().max(1.0) as u32;
    let resized = image::DynamicImage::ImageRgb8(img.to_rgb8()).resize_exact(width, height, FilterType::Triangle);
    let mut out = Cursor::new(Vec::new());
    resized.write_to(&mut out, ImageFormat::Jpeg).context("encoding jpeg")?;
    Ok(Bytes::from(out.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(w, h, image::Rgb([200, 10, 10]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn scaling_halves_dimensions() {
        let scaled = scale_to_jpeg(&png(40, 20), 0.5).unwrap();
        let back = image::load_from_memory(&scaled).unwrap();
        assert_eq!(back.dimensions(), (20, 10));
        assert_eq!(image::guess_format(&scaled).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn garbage_is_not_an_image() {
        assert!(scale_to_jpeg(b"not an image", 0.5).is_err());
    }

    #[tokio::test]
    async fn fetch_returns_raw_bytes_unscaled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cover.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;
        let f = HttpImageFetcher::new(reqwest::Client::new());
        let bytes = f.fetch(&format!("{}/cover.jpg", server.uri()), None).await.unwrap();
        assert_eq!(&bytes[..], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn fetch_scales_when_asked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/header.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(10, 10)))
            .mount(&server)
            .await;
        let f = HttpImageFetcher::new(reqwest::Client::new());
        let bytes = f.fetch(&format!("{}/header.png", server.uri()), Some(0.5)).await.unwrap();
        assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (5, 5));
    }

    #[tokio::test]
    async fn blank_url_and_http_errors_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let f = HttpImageFetcher::new(reqwest::Client::new());
        assert!(f.fetch("", None).await.is_err());
        assert!(f.fetch(&format!("{}/missing.jpg", server.uri()), None).await.is_err());
    }
}

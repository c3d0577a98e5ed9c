//! Page renderer: rasterize one PDF page, clamp the output, upload it to
//! the page cache and complete the request row.
//!
//! Render failures never retry in here; the request row is marked FAILED
//! and the pipeline carries on with the PDF text instead of the raster.

use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat};
use thiserror::Error;
use tracing::{error, info, warn};

use glazebid_db::models::RenderRequest;
use glazebid_db::{jobs, renders, storage_objects, DbError};

use crate::context::WorkerContext;
use crate::pdf::PdfError;
use crate::storage::{self, StorageError, BUCKET_PAGE_CACHE, BUCKET_RAW_UPLOADS};

/// PNG larger than this is re-encoded as JPEG.
const MAX_PNG_SIZE_BYTES: usize = 10 * 1024 * 1024;

/// Rendered pages age out of the cache after a week.
const PAGE_CACHE_TTL_DAYS: i64 = 7;

/// Lowest DPI the clamp will produce.
const MIN_RENDER_DPI: u32 = 36;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Clamp a requested DPI so the longest rendered edge stays within
/// `max_pixels`, with a hard DPI ceiling and a floor of 36.
pub fn clamp_dpi(
    page_width_pt: f32,
    page_height_pt: f32,
    requested_dpi: u32,
    max_dpi: u32,
    max_pixels: u32,
) -> u32 {
    let mut dpi = requested_dpi.min(max_dpi);

    let longest_px = page_width_pt.max(page_height_pt) / 72.0 * dpi as f32;
    if longest_px > max_pixels as f32 {
        let clamped = (dpi as f32 * max_pixels as f32 / longest_px) as u32;
        info!(
            "DPI clamped: requested {} -> {} (max pixels {})",
            requested_dpi, clamped, max_pixels
        );
        dpi = clamped;
    }

    dpi.max(MIN_RENDER_DPI)
}

/// Encode a raster as PNG, falling back to JPEG above the size guard.
/// Returns (bytes, content type, file extension).
pub fn encode_raster(
    image: &DynamicImage,
) -> Result<(Vec<u8>, &'static str, &'static str), RenderError> {
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    if png.len() <= MAX_PNG_SIZE_BYTES {
        return Ok((png, "image/png", "png"));
    }

    warn!("PNG too large ({} bytes), falling back to JPEG", png.len());
    let mut jpg = Vec::new();
    image
        .to_rgb8()
        .write_to(&mut Cursor::new(&mut jpg), ImageFormat::Jpeg)?;
    Ok((jpg, "image/jpeg", "jpg"))
}

/// Get the job's source PDF into its temp dir, downloading on first use.
/// The authoritative key comes from `storage_objects` when present.
pub async fn ensure_source_pdf(
    ctx: &WorkerContext,
    job_id: &str,
    project_id: Option<&str>,
) -> Result<PathBuf, RenderError> {
    let local_pdf = ctx.config.job_temp_dir(job_id).join("source.pdf");
    if local_pdf.exists() {
        return Ok(local_pdf);
    }

    let mut source_key = storage_objects::source_pdf_key(&ctx.pool, job_id)
        .await
        .ok()
        .flatten();

    if source_key.is_none() {
        let project = match project_id {
            Some(p) => Some(p.to_string()),
            None => jobs::job_project_id(&ctx.pool, job_id).await.ok().flatten(),
        };
        source_key = project.map(|p| storage::source_pdf_key(&p, job_id));
    }

    let key = source_key.ok_or_else(|| StorageError::NotFound {
        bucket: BUCKET_RAW_UPLOADS.to_string(),
        key: format!("<unknown>/{}/source.pdf", job_id),
    })?;

    ctx.store
        .download(BUCKET_RAW_UPLOADS, &key, &local_pdf)
        .await?;
    Ok(local_pdf)
}

/// Render one request end to end. Marks the request DONE or FAILED; the
/// returned error is for the caller's log only.
pub async fn process_render_request(ctx: &WorkerContext, request: &RenderRequest) {
    info!(
        "Processing render request {} (job {} page {} {} @ {}dpi)",
        request.id, request.job_id, request.page_num, request.kind, request.dpi
    );

    match render_and_upload(ctx, request).await {
        Ok(output_key) => {
            if let Err(e) = renders::complete_render_request(&ctx.pool, &request.id, &output_key).await
            {
                error!("Could not complete render request {}: {}", request.id, e);
            } else {
                info!("Render request {} complete: {}", request.id, output_key);
            }
        }
        Err(e) => {
            error!("Render request {} failed: {}", request.id, e);
            if let Err(e) = renders::fail_render_request(&ctx.pool, &request.id).await {
                error!("Could not mark render request {} failed: {}", request.id, e);
            }
        }
    }
}

async fn render_and_upload(
    ctx: &WorkerContext,
    request: &RenderRequest,
) -> Result<String, RenderError> {
    let page_num = request.page_num as u32;
    let kind_prefix = if request.kind == "MEASURE" { "measure" } else { "thumb" };
    let requested_dpi = if request.dpi > 0 {
        request.dpi as u32
    } else if request.kind == "MEASURE" {
        ctx.config.measure_dpi
    } else {
        ctx.config.thumb_dpi
    };

    let local_pdf = ensure_source_pdf(ctx, &request.job_id, None).await?;

    let (bytes, content_type, ext) = {
        let doc = ctx.pdf.open(&local_pdf)?;
        let (width_pt, height_pt) = doc.page_size(page_num)?;
        let dpi = clamp_dpi(
            width_pt,
            height_pt,
            requested_dpi,
            ctx.config.max_render_dpi,
            ctx.config.max_render_pixels,
        );
        let image = doc.render_page(page_num, dpi)?;
        info!(
            "Rendered job {} page {} at {}dpi ({}x{})",
            request.job_id,
            page_num,
            dpi,
            image.width(),
            image.height()
        );
        encode_raster(&image)?
    };

    let output_key = storage::page_render_key(&request.job_id, kind_prefix, page_num, ext);
    let size = bytes.len() as u64;
    ctx.store
        .upload_bytes(BUCKET_PAGE_CACHE, &output_key, bytes, content_type)
        .await?;

    // Record ownership so the retention sweep can expire the raster.
    if let Err(e) = storage_objects::insert_object(
        &ctx.pool,
        &request.job_id,
        BUCKET_PAGE_CACHE,
        &output_key,
        size,
        "",
        content_type,
        PAGE_CACHE_TTL_DAYS,
    )
    .await
    {
        warn!("Could not record page-cache object {}: {}", output_key, e);
    }

    Ok(output_key)
}

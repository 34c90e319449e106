//! The PDF <-> JSON conversion service.

use super::analysis::log_analysis;
use super::normalize::FontNormalizer;
use super::progress::{ranged_percent, ConversionProgress, ProgressReporter};
use crate::cache::{CachedDocumentEntry, ExpiryScheduler, LazyDocumentCache};
use crate::config::ConverterConfig;
use crate::error::{Error, Result};
use crate::font::{
    CffConverter, FallbackFontCatalog, FontCollector, FontMap, FontRegistry, FontResolver,
    Type3Converter,
};
use crate::model::{
    build_font_uid, font_map_key, DocumentMetadataSummary, DocumentModel, FontModel, PageModel,
};
use crate::parser::{
    apply_metadata, apply_xmp_metadata, encode_images, extract_annotations, extract_content_streams,
    extract_form_fields, extract_metadata, extract_page, extract_resources, extract_xmp_metadata,
    load_document, page_dimension, page_dimensions, page_id, scan_page, PageOptions,
};
use crate::reconstruct::{rebuild_page, restore_form_fields};
use crate::render::{to_json, JsonFormat};
use crate::util::page_resources;
use chrono::Utc;
use lopdf::{dictionary, Document, Object, ObjectId};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Documents with more pages than this defer image extraction when they
/// are converted under a job id.
pub const LAZY_IMAGE_PAGE_THRESHOLD: u32 = 5;

type PageFonts = HashMap<u32, BTreeMap<String, String>>;

/// Converts PDFs to document models and back.
///
/// Conversions run synchronously on the calling thread. Documents converted
/// under a job id are cached for page-level and incremental operations and
/// expire after the configured idle window.
///
/// # Example
///
/// ```no_run
/// use pdfjson::{ConverterConfig, PdfJsonConverter};
///
/// let converter = PdfJsonConverter::new(ConverterConfig::default());
/// let data = std::fs::read("document.pdf")?;
/// let json = converter.convert_pdf_to_json(&data, None, &|p| println!("{}", p))?;
/// let rebuilt = converter.convert_json_to_pdf(json.as_bytes(), None)?;
/// std::fs::write("rebuilt.pdf", rebuilt)?;
/// # Ok::<(), pdfjson::Error>(())
/// ```
pub struct PdfJsonConverter {
    config: ConverterConfig,
    cache: Arc<LazyDocumentCache>,
    registry: Arc<FontRegistry>,
    catalog: FallbackFontCatalog,
    cff: CffConverter,
    normalizer: FontNormalizer,
    type3: Option<Arc<dyn Type3Converter>>,
    expiry: Option<ExpiryScheduler>,
}

impl PdfJsonConverter {
    pub fn new(config: ConverterConfig) -> Self {
        let cache = Arc::new(LazyDocumentCache::new(
            config.cache_budget_bytes,
            config.spill_dir_or_temp(),
        ));
        let registry = Arc::new(FontRegistry::new());

        let weak_cache = Arc::downgrade(&cache);
        let expiry_registry = Arc::clone(&registry);
        let expiry = match ExpiryScheduler::start(move |job_id| {
            if let Some(cache) = weak_cache.upgrade() {
                if cache.remove(job_id).is_some() {
                    log::info!("Auto-cleaned cached document for job {}", job_id);
                }
            }
            expiry_registry.sweep_job(job_id);
        }) {
            Ok(scheduler) => Some(scheduler),
            Err(e) => {
                log::warn!("Cache expiry disabled, worker failed to start: {}", e);
                None
            }
        };

        Self {
            catalog: FallbackFontCatalog::new(config.fallback_font_dir.clone()),
            cff: CffConverter::new(config.cff.clone()),
            normalizer: FontNormalizer::new(config.normalization.clone()),
            type3: None,
            config,
            cache,
            registry,
            expiry,
        }
    }

    /// Use `converter` to produce candidates for glyph-indexed fonts.
    pub fn with_type3_converter(mut self, converter: Arc<dyn Type3Converter>) -> Self {
        self.type3 = Some(converter);
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn cache(&self) -> &LazyDocumentCache {
        &self.cache
    }

    pub fn font_registry(&self) -> &FontRegistry {
        &self.registry
    }

    /// Convert a PDF to its JSON document model.
    pub fn convert_pdf_to_json(
        &self,
        data: &[u8],
        job_id: Option<&str>,
        progress: &dyn Fn(ConversionProgress),
    ) -> Result<String> {
        let reporter = ProgressReporter::new(progress);
        let model = self.forward(data, job_id, &reporter)?;
        reporter.stage(95, "serializing", "Generating JSON output");
        let json = to_json(&model, JsonFormat::Compact)?;
        reporter.report(ConversionProgress::complete());
        Ok(json)
    }

    /// Convert a PDF to a document model.
    pub fn convert_pdf_to_model(
        &self,
        data: &[u8],
        job_id: Option<&str>,
        progress: &dyn Fn(ConversionProgress),
    ) -> Result<DocumentModel> {
        let reporter = ProgressReporter::new(progress);
        let model = self.forward(data, job_id, &reporter)?;
        reporter.report(ConversionProgress::complete());
        Ok(model)
    }

    fn forward(
        &self,
        data: &[u8],
        job_id: Option<&str>,
        reporter: &ProgressReporter<'_>,
    ) -> Result<DocumentModel> {
        if data.is_empty() {
            return Err(Error::MissingInput("PDF input is empty".to_string()));
        }
        let job_id = real_job_id(job_id);
        log::info!("Starting PDF to JSON conversion (job: {:?})", job_id);

        reporter.stage(5, "loading", "Loading PDF document");
        let mut working = Cow::Borrowed(data);
        if self.normalizer.is_available() {
            reporter.stage(10, "normalizing", "Normalizing fonts with Ghostscript");
            if let Some(normalized) = self.normalizer.normalize(data) {
                working = Cow::Owned(normalized);
            }
        }

        reporter.stage(20, "parsing", "Parsing PDF structure");
        let doc = load_document(&working)?;
        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
        let total = pages.len() as u32;
        let lazy_images =
            job_id.is_some() && (self.config.lazy_images || total > LAZY_IMAGE_PAGE_THRESHOLD);
        let options = PageOptions {
            lightweight: self.config.lightweight,
            skip_images: lazy_images,
            parallel: self.config.parallel,
        };
        log::info!(
            "Converting PDF to JSON ({} pages) - {} mode",
            total,
            if lazy_images { "lazy image" } else { "standard" }
        );

        reporter.stage(30, "fonts", "Collecting font information");
        let (fonts, page_fonts) = self.collect_fonts(&doc, &pages, job_id, Some(reporter));

        reporter.stage(50, "text", "Extracting text content");
        let mut page_models = Vec::with_capacity(pages.len());
        let mut pending_images = Vec::with_capacity(pages.len());
        for &(number, id) in &pages {
            let dimension = page_dimension(&doc, id, number);
            let mut page = PageModel::new(number, dimension.width, dimension.height);
            page.rotation = Some(dimension.rotation);
            let scan = scan_page(&doc, id, !lazy_images);
            page.text_elements = scan.text_elements;
            pending_images.push(scan.images);
            page_models.push(page);
        }

        if lazy_images {
            reporter.stage(70, "images", "Skipping upfront image extraction");
        } else {
            reporter.stage(70, "images", "Extracting embedded images");
        }
        for (page, images) in page_models.iter_mut().zip(pending_images) {
            page.image_elements = encode_images(images, page.page_number, true, options.parallel);
        }

        reporter.stage(80, "annotations", "Collecting annotations and form fields");
        for (index, (page, &(_, id))) in page_models.iter_mut().zip(&pages).enumerate() {
            page.resources = extract_resources(&doc, id, options.resources_policy());
            page.content_streams = extract_content_streams(&doc, id);
            page.annotations = extract_annotations(&doc, id, options.annotation_policy());
            let current = index as u32 + 1;
            reporter.report(
                ConversionProgress::new(
                    ranged_percent(80, 90, current, total),
                    "annotations",
                    "Collecting annotations",
                )
                .with_count(current, total),
            );
        }
        let form_fields = extract_form_fields(&doc, options.form_field_policy());

        reporter.stage(90, "metadata", "Extracting metadata");
        let model = DocumentModel {
            metadata: Some(extract_metadata(&doc)),
            xmp_metadata: extract_xmp_metadata(&doc),
            fonts: fonts.values().cloned().collect(),
            pages: page_models,
            form_fields,
            lazy_images: Some(lazy_images),
        };

        if let Some(job) = job_id {
            let summary = DocumentMetadataSummary {
                job_id: job.to_string(),
                metadata: model.metadata.clone(),
                xmp_metadata: model.xmp_metadata.clone(),
                fonts: model.fonts.clone(),
                page_dimensions: page_dimensions(&doc),
                form_fields: model.form_fields.clone(),
                lazy_images,
            };
            self.store(
                CachedDocumentEntry::new(job, working.into_owned())
                    .with_metadata(summary)
                    .with_fonts(fonts)
                    .with_page_fonts(page_fonts),
            );
        }

        if self.config.debug_analysis {
            log_analysis(&model);
        }
        log::info!(
            "PDF to JSON conversion complete (fonts: {}, pages: {}, lazyImages: {})",
            model.fonts.len(),
            model.pages.len(),
            lazy_images
        );
        Ok(model)
    }

    /// Fonts of every page keyed by uid, and per page the resource id to
    /// key mapping.
    fn collect_fonts(
        &self,
        doc: &Document,
        pages: &[(u32, ObjectId)],
        job_id: Option<&str>,
        reporter: Option<&ProgressReporter<'_>>,
    ) -> (BTreeMap<String, FontModel>, PageFonts) {
        let mut collector = FontCollector::new(doc, &self.cff)
            .with_job_id(job_id)
            .lightweight(self.config.lightweight)
            .with_type3_converter(self.type3.as_deref());
        let mut fonts = BTreeMap::new();
        let mut page_fonts = HashMap::new();
        let total = pages.len() as u32;

        for &(number, id) in pages {
            let models = match page_resources(doc, id) {
                Some(resources) => collector.collect_page(number, resources),
                None => Vec::new(),
            };
            let mut resource_map = BTreeMap::new();
            for font in models {
                let key = font
                    .uid
                    .clone()
                    .unwrap_or_else(|| font_map_key(font.page_or_independent(), &font.id));
                resource_map.insert(font.id.clone(), key.clone());
                fonts.entry(key).or_insert(font);
            }
            log::debug!("Collected {} font resources on page {}", resource_map.len(), number);
            page_fonts.insert(number, resource_map);

            if let Some(reporter) = reporter {
                reporter.report(
                    ConversionProgress::new(
                        ranged_percent(30, 50, number, total),
                        "fonts",
                        "Collecting fonts",
                    )
                    .with_count(number, total),
                );
            }
        }
        (fonts, page_fonts)
    }

    /// Convert a JSON document model back to PDF bytes.
    pub fn convert_json_to_pdf(&self, json: &[u8], job_id: Option<&str>) -> Result<Vec<u8>> {
        if json.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::MissingInput("JSON input is empty".to_string()));
        }
        let model: DocumentModel = serde_json::from_slice(json)?;
        self.convert_model_to_pdf(&model, job_id)
    }

    /// Build a PDF from a document model.
    ///
    /// Without a job id, font uids are scoped to a synthetic one whose
    /// registry entries are swept when the call returns.
    pub fn convert_model_to_pdf(&self, model: &DocumentModel, job_id: Option<&str>) -> Result<Vec<u8>> {
        let real = real_job_id(job_id);
        let scope = real.map_or_else(synthetic_job_id, str::to_string);
        let _sweep = ScopeSweep {
            registry: &self.registry,
            job_id: real.is_none().then(|| scope.clone()),
        };
        let fonts = scoped_fonts(&model.fonts, &scope);
        let resolver = FontResolver::new(&self.catalog, &self.registry);

        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => 0,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        if let Some(metadata) = &model.metadata {
            apply_metadata(&mut doc, metadata);
        }
        if let Some(xmp) = &model.xmp_metadata {
            if let Err(e) = apply_xmp_metadata(&mut doc, xmp) {
                log::warn!("Skipping XMP metadata: {}", e);
            }
        }

        for font in fonts.iter().filter(|f| f.is_type3()) {
            resolver.register_normalized(font);
        }
        let mut font_map = FontMap::build(&mut doc, &resolver, &fonts);
        log::info!("Converting JSON to PDF ({} font resources)", font_map.len());

        let mut kids = Vec::with_capacity(model.pages.len());
        for (index, page) in model.pages.iter().enumerate() {
            let mut page = page.clone();
            if page.page_number == 0 {
                page.page_number = index as u32 + 1;
            }
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            });
            kids.push(Object::Reference(page_id));
            let mode = rebuild_page(&mut doc, page_id, &mut page, &mut font_map, &resolver)?;
            log::info!("Reconstructed page {} ({})", page.page_number, mode);
        }

        let count = kids.len() as i64;
        let pages = doc.get_object_mut(pages_id).and_then(Object::as_dict_mut)?;
        pages.set("Kids", kids);
        pages.set("Count", count);

        font_map.finish(&mut doc);
        restore_form_fields(&mut doc, &model.form_fields)?;
        save_document(&mut doc)
    }

    /// Document summary without page content. The document is cached under
    /// `job_id` so that pages can be fetched one by one.
    pub fn extract_document_metadata(
        &self,
        data: &[u8],
        job_id: Option<&str>,
        progress: &dyn Fn(ConversionProgress),
    ) -> Result<DocumentMetadataSummary> {
        if data.is_empty() {
            return Err(Error::MissingInput("PDF input is empty".to_string()));
        }
        let reporter = ProgressReporter::new(progress);
        let job_id = real_job_id(job_id);
        let doc = load_document(data)?;
        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();

        reporter.stage(30, "fonts", "Collecting font information");
        let (fonts, page_fonts) = self.collect_fonts(&doc, &pages, job_id, None);

        reporter.stage(90, "metadata", "Extracting metadata");
        let summary = DocumentMetadataSummary {
            job_id: job_id.unwrap_or_default().to_string(),
            metadata: Some(extract_metadata(&doc)),
            xmp_metadata: extract_xmp_metadata(&doc),
            fonts: fonts.values().cloned().collect(),
            page_dimensions: page_dimensions(&doc),
            form_fields: extract_form_fields(&doc, self.page_options(false).form_field_policy()),
            lazy_images: true,
        };

        if let Some(job) = job_id {
            log::info!(
                "Caching {} bytes ({} pages, {} fonts) for lazy loading, job {}",
                data.len(),
                pages.len(),
                fonts.len(),
                job
            );
            self.store(
                CachedDocumentEntry::new(job, data.to_vec())
                    .with_metadata(summary.clone())
                    .with_fonts(fonts)
                    .with_page_fonts(page_fonts),
            );
        }

        reporter.report(ConversionProgress::new(100, "complete", "Metadata extraction complete"));
        Ok(summary)
    }

    /// Extract one page of a cached document, reloading it from the cached
    /// bytes.
    pub fn extract_single_page(&self, job_id: &str, page_number: u32) -> Result<PageModel> {
        let cached = self.cached(job_id)?;
        let bytes = cached.bytes()?;
        let doc = load_document(&bytes)?;
        let total = cached
            .metadata
            .as_ref()
            .map(|m| m.page_dimensions.len() as u32)
            .unwrap_or_else(|| doc.get_pages().len() as u32);
        if page_number == 0 || page_number > total {
            return Err(Error::PageOutOfRange(page_number, total));
        }

        let id = page_id(&doc, page_number)?;
        let page = extract_page(&doc, id, page_number, self.page_options(false));
        log::debug!(
            "Extracted page {} (text: {}, images: {}, annotations: {}) for job {}",
            page_number,
            page.text_elements.len(),
            page.image_elements.len(),
            page.annotations.len(),
            job_id
        );
        Ok(page)
    }

    /// Apply changed pages to the cached document and return the updated
    /// PDF. The cache entry is replaced with the result.
    pub fn export_updated_pages(&self, job_id: &str, updates: &DocumentModel) -> Result<Vec<u8>> {
        let job = job_id.trim();
        if job.is_empty() {
            return Err(Error::MissingInput("job id is required for incremental export".to_string()));
        }
        let cached = self.cached(job)?;
        let original = cached.bytes()?;
        if updates.pages.is_empty() {
            log::info!("Incremental export with no page updates; returning cached PDF for job {}", job);
            return Ok(original.to_vec());
        }

        let mut doc = load_document(&original)?;
        let mut fonts: Vec<FontModel> = cached.fonts.values().cloned().collect();
        for font in &updates.fonts {
            if !fonts.iter().any(|f| f.id == font.id && f.uid == font.uid) {
                fonts.push(font.clone());
            }
        }

        let resolver = FontResolver::new(&self.catalog, &self.registry);
        for font in fonts.iter().filter(|f| f.is_type3()) {
            resolver.register_normalized(font);
        }
        let mut font_map = FontMap::build(&mut doc, &resolver, &fonts);

        let page_ids = doc.get_pages();
        let mut updated = Vec::new();
        for page in &updates.pages {
            let Some(&id) = page_ids.get(&page.page_number) else {
                log::warn!(
                    "Skipping incremental update for out-of-range page {} (job {})",
                    page.page_number,
                    job
                );
                continue;
            };
            let mut page = page.clone();
            rebuild_page(&mut doc, id, &mut page, &mut font_map, &resolver)?;
            updated.push(page.page_number);
        }
        if updated.is_empty() {
            log::info!("Incremental export for job {} updated no pages; returning cached PDF", job);
            return Ok(original.to_vec());
        }

        font_map.finish(&mut doc);
        let bytes = save_document(&mut doc)?;
        self.registry.sweep_job(job);
        self.store(cached.with_updated_bytes(bytes.clone()));
        updated.sort_unstable();
        log::info!("Incremental export complete for job {} (pages updated: {:?})", job, updated);
        Ok(bytes)
    }

    /// Drop the cached document of a job and its font registry entries.
    /// Returns whether a document was cached.
    pub fn clear_cached_document(&self, job_id: &str) -> bool {
        let removed = self.cache.remove(job_id);
        let swept = self.registry.sweep_job(job_id);
        if let Some(entry) = &removed {
            log::info!(
                "Removed cached document ({} bytes, {} registry entries) for job {}",
                entry.size(),
                swept,
                job_id
            );
        }
        removed.is_some()
    }

    fn cached(&self, job_id: &str) -> Result<Arc<CachedDocumentEntry>> {
        self.cache
            .get(job_id)
            .ok_or_else(|| Error::CacheUnavailable(job_id.to_string()))
    }

    fn page_options(&self, skip_images: bool) -> PageOptions {
        PageOptions {
            lightweight: self.config.lightweight,
            skip_images,
            parallel: self.config.parallel,
        }
    }

    fn store(&self, entry: CachedDocumentEntry) {
        let job_id = entry.job_id.clone();
        match self.cache.put(entry) {
            Ok(evicted) => {
                for evicted_id in evicted.iter().filter(|id| **id != job_id) {
                    self.registry.sweep_job(evicted_id);
                }
                if let Some(expiry) = &self.expiry {
                    expiry.schedule(&job_id, self.config.cache_ttl);
                }
            }
            Err(e) => log::warn!("Failed to cache document for job {}: {}", job_id, e),
        }
    }
}

impl std::fmt::Debug for PdfJsonConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfJsonConverter")
            .field("config", &self.config)
            .field("cached_jobs", &self.cache.len())
            .field("type3", &self.type3)
            .finish()
    }
}

impl Default for PdfJsonConverter {
    fn default() -> Self {
        Self::new(ConverterConfig::default())
    }
}

fn real_job_id(job_id: Option<&str>) -> Option<&str> {
    job_id.map(str::trim).filter(|j| !j.is_empty())
}

fn synthetic_job_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!(
        "synthetic-{}-{}",
        Utc::now().timestamp_millis(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Copies of `fonts` with uids rebuilt under `job_id`.
fn scoped_fonts(fonts: &[FontModel], job_id: &str) -> Vec<FontModel> {
    fonts
        .iter()
        .map(|font| {
            let mut font = font.clone();
            font.uid = Some(build_font_uid(Some(job_id), font.page_or_independent(), &font.id));
            font
        })
        .collect()
}

/// Sweeps a synthetic job's registry entries when dropped, on error paths
/// as well as on success.
struct ScopeSweep<'a> {
    registry: &'a FontRegistry,
    job_id: Option<String>,
}

impl Drop for ScopeSweep<'_> {
    fn drop(&mut self) {
        if let Some(job_id) = &self.job_id {
            self.registry.sweep_job(job_id);
        }
    }
}

/// Serialize `doc` without the objects that rebuilding left unreferenced.
fn save_document(doc: &mut Document) -> Result<Vec<u8>> {
    let pruned = doc.prune_objects();
    if !pruned.is_empty() {
        log::debug!("Pruned {} unreferenced objects", pruned.len());
    }
    doc.compress();
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

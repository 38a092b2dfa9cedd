use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use mascot_contracts::events::{EventPayload, EventWriter};
use mascot_contracts::media::EncodedImage;
use mascot_contracts::projects::{
    new_project_id, project_name, CustomColors, PresentationCatalog, ProjectRecord,
};
use mascot_contracts::sections::{
    self, distribute_slots, ImageSlot, MoveDirection, SectionHistory, SectionNode, SectionPatch,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::adjust::ImageAdjustments;
use crate::map_object;
use crate::orchestrator::{image_digest, GenerationOrchestrator, VariationOutcome};

/// Layout, palette and typography picked for the generated site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    pub layout_id: u32,
    pub color_scheme_id: String,
    pub font_name: String,
    pub custom_colors: CustomColors,
}

impl Presentation {
    pub fn from_catalog(catalog: &PresentationCatalog) -> Self {
        Self {
            layout_id: catalog.default_layout().id,
            color_scheme_id: catalog.default_scheme().name.clone(),
            font_name: catalog.default_font().name.clone(),
            custom_colors: CustomColors::default(),
        }
    }
}

/// One mascot project being generated and laid out.
///
/// Holds the flat image list (candidates before the builder step, the four
/// slot images after it), the section edit history and the presentation
/// choices. Persistence stays outside: the session only produces and
/// restores [`ProjectRecord`] snapshots.
pub struct StudioSession {
    orchestrator: GenerationOrchestrator,
    catalog: PresentationCatalog,
    events: EventWriter,
    project_id: Option<String>,
    created_at: Option<i64>,
    prompt: String,
    reference: Option<EncodedImage>,
    images: Vec<EncodedImage>,
    selected: usize,
    in_builder: bool,
    presentation: Presentation,
    history: SectionHistory,
}

impl StudioSession {
    pub fn new(orchestrator: GenerationOrchestrator) -> Result<Self> {
        let catalog = PresentationCatalog::default();
        let events = orchestrator.events().clone();
        events.emit(
            "session_started",
            map_object(json!({
                "provider": orchestrator.generator_name(),
            })),
        )?;
        Ok(Self {
            presentation: Presentation::from_catalog(&catalog),
            orchestrator,
            catalog,
            events,
            project_id: None,
            created_at: None,
            prompt: String::new(),
            reference: None,
            images: Vec::new(),
            selected: 0,
            in_builder: false,
            history: SectionHistory::default(),
        })
    }

    pub fn new_project(&mut self) {
        self.project_id = None;
        self.created_at = None;
        self.prompt.clear();
        self.reference = None;
        self.images.clear();
        self.selected = 0;
        self.in_builder = false;
        self.presentation = Presentation::from_catalog(&self.catalog);
        self.history = SectionHistory::default();
        info!("new project");
    }

    /// Restores a saved project. History starts over from the saved sections.
    pub fn open_project(&mut self, record: &ProjectRecord) -> Result<()> {
        let images = record
            .generated_images
            .iter()
            .enumerate()
            .map(|(idx, url)| {
                EncodedImage::from_data_url(url)
                    .with_context(|| format!("project image {} is not a data URL", idx + 1))
            })
            .collect::<Result<Vec<_>>>()?;

        self.project_id = Some(record.id.clone()).filter(|id| !id.is_empty());
        self.created_at = Some(record.created_at);
        self.prompt = record.prompt.clone();
        self.reference = None;
        self.in_builder = !images.is_empty();
        self.images = images;
        self.selected = 0;
        self.presentation = Presentation {
            layout_id: self.catalog.layout(record.layout_id).id,
            color_scheme_id: self.catalog.scheme(&record.color_scheme_id).name.clone(),
            font_name: self.catalog.font(&record.font_name).name.clone(),
            custom_colors: record.custom_colors.clone(),
        };
        self.history = SectionHistory::new(record.sections.clone());
        info!(project = %record.id, images = self.images.len(), "project opened");
        Ok(())
    }

    /// Snapshot for the storage layer; `now` is epoch milliseconds.
    pub fn capture_project(&mut self, now: i64) -> ProjectRecord {
        let id = self.project_id.get_or_insert_with(new_project_id).clone();
        let created_at = *self.created_at.get_or_insert(now);
        let sections = self.history.current().to_vec();
        ProjectRecord {
            id,
            name: project_name(&sections, &self.prompt),
            thumbnail: self
                .images
                .first()
                .map(EncodedImage::to_data_url)
                .unwrap_or_default(),
            created_at,
            updated_at: now,
            layout_id: self.presentation.layout_id,
            color_scheme_id: self.presentation.color_scheme_id.clone(),
            font_name: self.presentation.font_name.clone(),
            custom_colors: self.presentation.custom_colors.clone(),
            sections,
            generated_images: self.images.iter().map(EncodedImage::to_data_url).collect(),
            prompt: self.prompt.clone(),
        }
    }

    pub fn save_project(&mut self, path: &Path) -> Result<ProjectRecord> {
        let record = self.capture_project(Utc::now().timestamp_millis());
        record.save(path)?;
        self.record(
            "project_saved",
            map_object(json!({
                "project_id": record.id,
                "name": record.name,
                "path": path.to_string_lossy(),
                "images": record.generated_images.len(),
            })),
        );
        Ok(record)
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_reference(&mut self, reference: Option<EncodedImage>) {
        self.reference = reference;
    }

    pub fn images(&self) -> &[EncodedImage] {
        &self.images
    }

    pub fn in_builder(&self) -> bool {
        self.in_builder
    }

    pub fn slot_image(&self, slot: ImageSlot) -> Option<&EncodedImage> {
        if !self.in_builder {
            return None;
        }
        self.images.get(slot.index())
    }

    /// Replaces the image list with a fresh anchor for `prompt`.
    ///
    /// On failure the previous images are already gone, matching a new
    /// generation request that never produced anything.
    pub fn generate_anchor(&mut self, prompt: &str) -> Result<&EncodedImage> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            bail!("Please provide a prompt to generate an image.");
        }
        self.prompt = prompt.to_string();
        self.images.clear();
        self.selected = 0;
        self.in_builder = false;

        let anchor = self
            .orchestrator
            .generate_anchor(&self.prompt, self.reference.as_ref())?;
        self.images.push(anchor);
        Ok(&self.images[0])
    }

    /// Appends pose variations of the first image.
    pub fn generate_variations(&mut self) -> Result<VariationOutcome> {
        if self.in_builder {
            bail!("variations are only available before building the site");
        }
        let Some(anchor) = self.images.first().cloned() else {
            bail!("generate a character before asking for variations");
        };
        let outcome = self
            .orchestrator
            .generate_variations(&self.prompt, &anchor);
        self.images.extend(outcome.images.iter().cloned());
        Ok(outcome)
    }

    pub fn select_image(&mut self, index: usize) -> Result<()> {
        if index >= self.images.len() {
            bail!(
                "no image {} (have {})",
                index + 1,
                self.images.len()
            );
        }
        self.selected = index;
        Ok(())
    }

    /// Clones the selected candidate into the four website slots.
    pub fn proceed_to_builder(&mut self) -> Result<()> {
        let Some(selected) = self.images.get(self.selected) else {
            bail!("no generated image to build with");
        };
        self.images = distribute_slots(selected);
        self.selected = 0;
        self.in_builder = true;
        info!("moved to builder");
        Ok(())
    }

    fn slot_index(&self, index: usize) -> Result<usize> {
        if !self.in_builder {
            bail!("image slots exist only after building the site");
        }
        if index >= self.images.len() {
            bail!("unknown image slot: {}", index + 1);
        }
        Ok(index)
    }

    /// Single-attempt remote edit of one slot. The slot keeps its image on failure.
    pub fn edit_slot(
        &mut self,
        index: usize,
        edit_prompt: &str,
        adjustments: ImageAdjustments,
    ) -> Result<&EncodedImage> {
        let index = self.slot_index(index)?;
        let edit_prompt = edit_prompt.trim();
        if edit_prompt.is_empty() {
            bail!("edit prompt is empty");
        }
        let source = adjustments.apply(&self.images[index])?;
        let edited = self.orchestrator.edit(&source, edit_prompt)?;
        self.replace_slot(index, edited, "edit");
        Ok(&self.images[index])
    }

    /// Bakes adjustments into one slot locally.
    pub fn apply_adjustments(&mut self, index: usize, adjustments: ImageAdjustments) -> Result<()> {
        let index = self.slot_index(index)?;
        if adjustments.is_identity() {
            debug!(slot = index, "identity adjustments skipped");
            return Ok(());
        }
        let adjusted = adjustments.apply(&self.images[index])?;
        self.replace_slot(index, adjusted, "adjust");
        Ok(())
    }

    fn replace_slot(&mut self, index: usize, image: EncodedImage, how: &str) {
        let slot = ImageSlot::from_index(index)
            .map(|slot| slot.to_string())
            .unwrap_or_else(|| index.to_string());
        let payload = map_object(json!({
            "slot": slot,
            "how": how,
            "image_id": image_digest(&image),
            "mime_type": image.mime_type,
        }));
        self.images[index] = image;
        self.record("image_edited", payload);
    }

    /// Events after a committed change are best effort; the change stands.
    fn record(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.events.emit(event_type, payload) {
            warn!(event_type, error = %err, "event write failed");
        }
    }

    pub fn sections(&self) -> &[SectionNode] {
        self.history.current()
    }

    fn push_sections(&mut self, snapshot: Vec<SectionNode>, reason: &str) {
        self.history.push(snapshot);
        self.record(
            "sections_changed",
            map_object(json!({
                "reason": reason,
                "history_index": self.history.index(),
                "sections": self.history.current().len(),
            })),
        );
    }

    pub fn update_section(&mut self, id: &str, patch: &SectionPatch) -> Result<()> {
        let next = sections::patch_section(self.history.current(), id, patch)?;
        self.push_sections(next, "update");
        Ok(())
    }

    pub fn move_section(&mut self, id: &str, direction: MoveDirection) -> Result<()> {
        let next = sections::move_section(self.history.current(), id, direction)?;
        self.push_sections(next, "move");
        Ok(())
    }

    pub fn set_sections(&mut self, snapshot: Vec<SectionNode>) -> Result<()> {
        self.push_sections(snapshot, "replace");
        Ok(())
    }

    pub fn undo(&mut self) -> bool {
        self.history.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn finish(&self) -> Result<()> {
        self.events.emit(
            "session_finished",
            map_object(json!({
                "images": self.images.len(),
                "history_entries": self.history.snapshot_count(),
            })),
        )?;
        Ok(())
    }
}

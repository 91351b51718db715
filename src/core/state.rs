use crate::core::error::WizardError;
use std::fmt;

/// Raw image bytes plus their mime type, as attached to or returned from the model.
#[derive(Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// File extension matching the mime type, `png` when unknown.
    pub fn extension(&self) -> &'static str {
        image::ImageFormat::from_mime_type(&self.mime_type)
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("png")
    }
}

impl fmt::Debug for InlineImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// One candidate position of a scene. `Empty` marks a failed generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSlot {
    Image(InlineImage),
    Empty,
}

impl ImageSlot {
    pub fn image(&self) -> Option<&InlineImage> {
        match self {
            ImageSlot::Image(img) => Some(img),
            ImageSlot::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ImageSlot::Empty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub description: String,
    pub reference_image: Option<InlineImage>,
}

impl Character {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            id: format!("char-{}", index),
            name: name.into(),
            description: String::new(),
            reference_image: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.reference_image.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub id: String,
    pub title: String,
    pub dialogue: String,
    generated_images: Vec<ImageSlot>,
    selected: Option<usize>,
}

impl Scene {
    pub fn new(index: usize, title: impl Into<String>, dialogue: impl Into<String>) -> Self {
        Self {
            id: format!("scene-{}", index),
            title: title.into(),
            dialogue: dialogue.into(),
            generated_images: Vec::new(),
            selected: None,
        }
    }

    pub fn generated_images(&self) -> &[ImageSlot] {
        &self.generated_images
    }

    /// Replaces every candidate at once; the previous selection is dropped.
    pub fn replace_images(&mut self, slots: Vec<ImageSlot>) {
        self.generated_images = slots;
        self.selected = None;
    }

    pub fn select(&mut self, slot: usize) -> Result<(), WizardError> {
        match self.generated_images.get(slot) {
            Some(ImageSlot::Image(_)) => {
                self.selected = Some(slot);
                Ok(())
            }
            _ => Err(WizardError::NoSuchImage {
                scene: self.id.clone(),
                slot,
            }),
        }
    }

    pub fn selected_slot(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_image(&self) -> Option<&InlineImage> {
        self.selected
            .and_then(|i| self.generated_images.get(i))
            .and_then(ImageSlot::image)
    }
}

/// Characters and scenes produced by one analysis, edited in place by id afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Storyboard {
    pub characters: Vec<Character>,
    pub scenes: Vec<Scene>,
}

impl Storyboard {
    pub fn character_mut(&mut self, id: &str) -> Result<&mut Character, WizardError> {
        self.characters
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| WizardError::UnknownCharacter(id.to_string()))
    }

    pub fn scene(&self, id: &str) -> Result<&Scene, WizardError> {
        self.scenes
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| WizardError::UnknownScene(id.to_string()))
    }

    pub fn scene_mut(&mut self, id: &str) -> Result<&mut Scene, WizardError> {
        self.scenes
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| WizardError::UnknownScene(id.to_string()))
    }

    /// 1-based position of a scene, used for file names and progress messages.
    pub fn scene_number(&self, id: &str) -> Result<usize, WizardError> {
        self.scenes
            .iter()
            .position(|s| s.id == id)
            .map(|i| i + 1)
            .ok_or_else(|| WizardError::UnknownScene(id.to_string()))
    }

    pub fn missing_reference_images(&self) -> Vec<String> {
        self.characters
            .iter()
            .filter(|c| !c.is_complete())
            .map(|c| c.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WizardStep {
    Input = 1,
    SetupReview = 2,
    ReviewSelection = 3,
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WizardStep::Input => "1. Dialogue input",
            WizardStep::SetupReview => "2. Character & scene setup",
            WizardStep::ReviewSelection => "3. Review & select",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default)]
enum Stage {
    #[default]
    Input,
    SetupReview(Storyboard),
    ReviewSelection(Storyboard),
}

#[derive(Debug, Clone, Default)]
pub struct WizardState {
    script: String,
    stage: Stage,
    busy: Option<String>,
    error: Option<String>,
}

impl WizardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> WizardStep {
        match self.stage {
            Stage::Input => WizardStep::Input,
            Stage::SetupReview(_) => WizardStep::SetupReview,
            Stage::ReviewSelection(_) => WizardStep::ReviewSelection,
        }
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn storyboard(&self) -> Option<&Storyboard> {
        match &self.stage {
            Stage::Input => None,
            Stage::SetupReview(board) | Stage::ReviewSelection(board) => Some(board),
        }
    }

    /// Input -> SetupReview with the result of a successful analysis.
    pub fn begin_setup(&mut self, script: String, board: Storyboard) -> Result<(), WizardError> {
        if !matches!(self.stage, Stage::Input) {
            return Err(self.illegal("start setup"));
        }
        self.script = script;
        self.stage = Stage::SetupReview(board);
        Ok(())
    }

    pub fn setup_mut(&mut self) -> Result<&mut Storyboard, WizardError> {
        let illegal = self.illegal("edit setup");
        match &mut self.stage {
            Stage::SetupReview(board) => Ok(board),
            _ => Err(illegal),
        }
    }

    /// The storyboard a full generation run may start from.
    pub fn ready_for_generation(&self) -> Result<&Storyboard, WizardError> {
        match &self.stage {
            Stage::SetupReview(board) => {
                let missing = board.missing_reference_images();
                if missing.is_empty() {
                    Ok(board)
                } else {
                    Err(WizardError::MissingReferenceImages(missing))
                }
            }
            _ => Err(self.illegal("generate images")),
        }
    }

    /// SetupReview -> ReviewSelection, after the generation run has been applied.
    pub fn begin_review(&mut self) -> Result<(), WizardError> {
        match std::mem::take(&mut self.stage) {
            Stage::SetupReview(board) => {
                self.stage = Stage::ReviewSelection(board);
                Ok(())
            }
            other => {
                self.stage = other;
                Err(self.illegal("review selections"))
            }
        }
    }

    pub fn review_mut(&mut self) -> Result<&mut Storyboard, WizardError> {
        let illegal = self.illegal("change selections");
        match &mut self.stage {
            Stage::ReviewSelection(board) => Ok(board),
            _ => Err(illegal),
        }
    }

    pub fn review(&self) -> Result<&Storyboard, WizardError> {
        match &self.stage {
            Stage::ReviewSelection(board) => Ok(board),
            _ => Err(self.illegal("export")),
        }
    }

    /// Back to Input with nothing carried over.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn busy(&self) -> Option<&str> {
        self.busy.as_deref()
    }

    pub fn set_busy(&mut self, message: impl Into<String>) {
        self.busy = Some(message.into());
    }

    pub fn clear_busy(&mut self) {
        self.busy = None;
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    fn illegal(&self, action: &'static str) -> WizardError {
        WizardError::IllegalTransition {
            action,
            step: self.step(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(tag: u8) -> InlineImage {
        InlineImage::new("image/png", vec![tag])
    }

    fn board() -> Storyboard {
        Storyboard {
            characters: vec![Character::new(0, "JOHN"), Character::new(1, "JANE")],
            scenes: vec![
                Scene::new(0, "John greets", "JOHN: Hi"),
                Scene::new(1, "Jane answers", "JANE: Hi back"),
            ],
        }
    }

    #[test]
    fn test_linear_transitions() {
        let mut state = WizardState::new();
        assert_eq!(state.step(), WizardStep::Input);
        assert!(state.begin_review().is_err());
        assert_eq!(state.step(), WizardStep::Input);

        state.begin_setup("JOHN: Hi".to_string(), board()).unwrap();
        assert_eq!(state.step(), WizardStep::SetupReview);
        assert!(state.begin_setup(String::new(), board()).is_err());

        match state.ready_for_generation() {
            Err(WizardError::MissingReferenceImages(names)) => {
                assert_eq!(names, vec!["JOHN".to_string(), "JANE".to_string()])
            }
            other => panic!("unexpected: {:?}", other),
        }

        for c in &mut state.setup_mut().unwrap().characters {
            c.reference_image = Some(png(0));
        }
        assert!(state.ready_for_generation().is_ok());

        state.begin_review().unwrap();
        assert_eq!(state.step(), WizardStep::ReviewSelection);
        assert!(state.setup_mut().is_err());
        assert!(state.begin_review().is_err());
        assert_eq!(state.step(), WizardStep::ReviewSelection);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = WizardState::new();
        state.begin_setup("JOHN: Hi".to_string(), board()).unwrap();
        state.set_busy("working");
        state.set_error("boom");

        state.reset();
        assert_eq!(state.step(), WizardStep::Input);
        assert_eq!(state.script(), "");
        assert!(state.storyboard().is_none());
        assert!(state.busy().is_none());
        assert!(state.error().is_none());
    }

    #[test]
    fn test_selection_must_point_at_an_image() {
        let mut scene = Scene::new(0, "t", "d");
        assert!(scene.select(0).is_err());

        scene.replace_images(vec![ImageSlot::Empty, ImageSlot::Image(png(7))]);
        assert!(scene.select(0).is_err());
        assert!(scene.select(2).is_err());
        scene.select(1).unwrap();
        assert_eq!(scene.selected_image(), Some(&png(7)));

        scene.replace_images(vec![ImageSlot::Image(png(8))]);
        assert_eq!(scene.selected_slot(), None);
        assert!(scene.selected_image().is_none());
    }

    #[test]
    fn test_scene_lookup() {
        let b = board();
        assert_eq!(b.scene_number("scene-1").unwrap(), 2);
        assert_eq!(
            b.scene("scene-9").unwrap_err(),
            WizardError::UnknownScene("scene-9".to_string())
        );
    }

    #[test]
    fn test_extension_from_mime() {
        assert_eq!(InlineImage::new("image/jpeg", vec![]).extension(), "jpg");
        assert_eq!(InlineImage::new("image/png", vec![]).extension(), "png");
        assert_eq!(InlineImage::new("application/x-unknown", vec![]).extension(), "png");
    }
}

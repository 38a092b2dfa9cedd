mod catalog;
mod record;

pub use catalog::{ColorScheme, FontSpec, Layout, PresentationCatalog};
pub use record::{new_project_id, project_name, BackgroundPattern, CustomColors, ProjectRecord};

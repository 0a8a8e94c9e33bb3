//! Constants used throughout the report core crate.
//!
//! Document control markers must stay bit-for-bit stable: templates and stored answers written
//! by earlier releases contain them literally.

/// Separates logical paragraphs collapsed into one merge-field value.
pub const QUESTION_SEPARATOR: &str = "<!--Q-->";

/// Separates lines inside one logical paragraph.
pub const LINE_SEPARATOR: &str = "<!--BR-->";

/// Prefix of a checklist anchor, `[CHECKLIST_<uuid>]`.
pub const CHECKLIST_ANCHOR_PREFIX: &str = "[CHECKLIST_";

/// Prefix of an answer-photo anchor, `[PHOTO_<uuid>]`.
pub const PHOTO_ANCHOR_PREFIX: &str = "[PHOTO_";

/// Literal placeholder replaced by the map screenshot.
pub const SCREENSHOT_TOKEN: &str = "expertiseMapScreenshot";

/// Bookmark whose paragraph is replaced by profile-document pages.
pub const ATTACHMENTS_BOOKMARK: &str = "attachments";

/// Key of the narrative parameters object inside checklist data.
pub const TYPE_TEXT_PARAMS_KEY: &str = "type_text_params";

/// Keys of the premises list used by the defect family and of each premise inside it.
pub const PREMISES_KEY: &str = "premises";
pub const PREMISE_NAME_KEY: &str = "premise_name";
pub const PREMISE_PARAMETERS_KEY: &str = "premise_parameters";
pub const PREMISE_PHOTOS_KEY: &str = "premise_photos";

/// Normative-documents field, labelled even when a template omits it.
pub const GOSTS_KEY: &str = "gosts";
pub const GOSTS_DEFAULT_LABEL: &str = "Нормативная документация";

/// Template names with dedicated renderers or mergers.
pub const DEFAULT_TEMPLATE: &str = "Default";
pub const AREA_TEMPLATE: &str = "Площадь земельного участка";
pub const LAND_PLOT_TEMPLATE: &str = "Сведения о земельном участке";
pub const CONSTRUCTION_TEMPLATE: &str = "Конструктивные характеристики";
pub const BUILDING_TEMPLATE: &str = "Сведения об объекте";
pub const DEFECT_TEMPLATE: &str = "Дефекты помещений";
pub const COMPLIANCE_TEMPLATE: &str = "Соответствие градостроительным нормам";

/// Placeholder shown where a value is missing.
pub const NOT_SPECIFIED: &str = "не указано";
pub const INVALID_FORMAT: &str = "неверный формат";

/// Caption prefix of numbered figures.
pub const FIGURE_CAPTION_PREFIX: &str = "Рисунок";

/// Default blob-store buckets.
pub const DEFAULT_CHECKLIST_BUCKET: &str = "checklist-files";
pub const DEFAULT_PHOTO_BUCKET: &str = "answer-photos";

/// Usable page width in twentieths of a point, shared by generated tables.
pub const TABLE_WIDTH_TWIPS: u32 = 9_638;

/// Red used for editor warnings left in the generated document.
pub const WARNING_COLOR: &str = "FF0000";

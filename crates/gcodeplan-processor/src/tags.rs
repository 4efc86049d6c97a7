//! Reserved comment tags and placeholders
//!
//! Slicers annotate the G-code with comment lines such as `;FEATURE: Outer
//! wall` or `;CHANGE_LAYER`. [`Tag::parse`] recognizes them from the
//! comment text (without the leading `;`); [`Placeholder::parse`] does the
//! same for the lines the rewriter replaces.

/// Out-of-band signal carried by a comment line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag<'a> {
    Feature(&'a str),
    ZHeight(&'a str),
    WipeStart,
    WipeEnd,
    WipeTowerStart,
    WipeTowerEnd,
    FlushStart,
    FlushEnd,
    VirtualFlushStart,
    VirtualFlushEnd,
    SkippableStart,
    SkippableEnd,
    SkipType(&'a str),
    LayerHeight(&'a str),
    LineWidth(&'a str),
    ChangeLayer,
    /// Everything after `COLOR_CHANGE`, e.g. `,T1,#FF0000`
    ColorChange(&'a str),
    PausePrinting,
    CustomGcode,
    MachineStartGcodeEnd,
    MachineEndGcodeStart,
    /// Everything after the tag, e.g. ` OF0 NF1`
    NozzleChangeStart(&'a str),
    NozzleChangeEnd(&'a str),
}

const PREFIX_TAGS: &[(&str, Tag<'static>)] = &[
    ("WIPE_START", Tag::WipeStart),
    ("WIPE_END", Tag::WipeEnd),
    ("WIPE_TOWER_START", Tag::WipeTowerStart),
    ("WIPE_TOWER_END", Tag::WipeTowerEnd),
    ("FLUSH_START", Tag::FlushStart),
    ("FLUSH_END", Tag::FlushEnd),
    ("VFLUSH_START", Tag::VirtualFlushStart),
    ("VFLUSH_END", Tag::VirtualFlushEnd),
    ("SKIPPABLE_START", Tag::SkippableStart),
    ("SKIPPABLE_END", Tag::SkippableEnd),
    ("MACHINE_START_GCODE_END", Tag::MachineStartGcodeEnd),
    ("MACHINE_END_GCODE_START", Tag::MachineEndGcodeStart),
];

impl<'a> Tag<'a> {
    /// Recognize a tag in comment text; leading whitespace is ignored
    pub fn parse(comment: &'a str) -> Option<Tag<'a>> {
        let text = comment.trim_start();
        let exact = text.trim_end();
        match exact {
            "CHANGE_LAYER" => return Some(Tag::ChangeLayer),
            "PAUSE_PRINTING" => return Some(Tag::PausePrinting),
            "CUSTOM_GCODE" => return Some(Tag::CustomGcode),
            _ => {}
        }
        let value = |prefix: &str| text.strip_prefix(prefix);
        if let Some(rest) = value("FEATURE:") {
            return Some(Tag::Feature(rest));
        }
        if let Some(rest) = value("Z_HEIGHT:") {
            return Some(Tag::ZHeight(rest));
        }
        if let Some(rest) = value("SKIPTYPE:") {
            return Some(Tag::SkipType(rest));
        }
        if let Some(rest) = value("LAYER_HEIGHT:") {
            return Some(Tag::LayerHeight(rest));
        }
        if let Some(rest) = value("LINE_WIDTH:") {
            return Some(Tag::LineWidth(rest));
        }
        if let Some(rest) = value("COLOR_CHANGE") {
            return Some(Tag::ColorChange(rest));
        }
        if let Some(rest) = value("NOZZLE_CHANGE_START") {
            return Some(Tag::NozzleChangeStart(rest));
        }
        if let Some(rest) = value("NOZZLE_CHANGE_END") {
            return Some(Tag::NozzleChangeEnd(rest));
        }
        PREFIX_TAGS
            .iter()
            .find(|(prefix, _)| text.starts_with(prefix))
            .map(|(_, tag)| *tag)
    }
}

/// Line the rewriter replaces with computed content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    FirstLineProgress,
    LastLineProgress,
    EstimatedPrintingTime,
    TotalLayerNumber,
    FilamentWeight,
    FilamentVolume,
    FilamentLength,
}

impl Placeholder {
    /// Recognize a placeholder in comment text
    pub fn parse(comment: &str) -> Option<Placeholder> {
        match comment.trim() {
            "_GP_FIRST_LINE_M73_PLACEHOLDER" | "_FIRST_LINE_PLACEHOLDER_" => {
                Some(Self::FirstLineProgress)
            }
            "_GP_LAST_LINE_M73_PLACEHOLDER" | "_LAST_LINE_PLACEHOLDER_" => {
                Some(Self::LastLineProgress)
            }
            "_GP_ESTIMATED_PRINTING_TIME_PLACEHOLDER" => Some(Self::EstimatedPrintingTime),
            "_GP_TOTAL_LAYER_NUMBER_PLACEHOLDER" => Some(Self::TotalLayerNumber),
            "_GP_FILAMENT_USED_WEIGHT_PLACEHOLDER" => Some(Self::FilamentWeight),
            "_GP_FILAMENT_USED_VOLUME_PLACEHOLDER" => Some(Self::FilamentVolume),
            "_GP_FILAMENT_USED_LENGTH_PLACEHOLDER" => Some(Self::FilamentLength),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_tags() {
        assert_eq!(Tag::parse("FEATURE: Outer wall"), Some(Tag::Feature(" Outer wall")));
        assert_eq!(Tag::parse(" LAYER_HEIGHT: 0.2"), Some(Tag::LayerHeight(" 0.2")));
        assert_eq!(
            Tag::parse("COLOR_CHANGE,T1,#FF0000"),
            Some(Tag::ColorChange(",T1,#FF0000"))
        );
    }

    #[test]
    fn test_similar_prefixes() {
        assert_eq!(Tag::parse("WIPE_START"), Some(Tag::WipeStart));
        assert_eq!(Tag::parse("WIPE_TOWER_START"), Some(Tag::WipeTowerStart));
        assert_eq!(Tag::parse("FLUSH_END"), Some(Tag::FlushEnd));
        assert_eq!(Tag::parse("VFLUSH_END"), Some(Tag::VirtualFlushEnd));
        assert_eq!(Tag::parse("NOZZLE_CHANGE_END OF0 NF1"), Some(Tag::NozzleChangeEnd(" OF0 NF1")));
    }

    #[test]
    fn test_exact_tags() {
        assert_eq!(Tag::parse("CHANGE_LAYER"), Some(Tag::ChangeLayer));
        assert_eq!(Tag::parse("CHANGE_LAYER_SOON"), None);
        assert_eq!(Tag::parse("PAUSE_PRINTING "), Some(Tag::PausePrinting));
        assert_eq!(Tag::parse("printing object"), None);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            Placeholder::parse("_FIRST_LINE_PLACEHOLDER_"),
            Some(Placeholder::FirstLineProgress)
        );
        assert_eq!(
            Placeholder::parse("_GP_LAST_LINE_M73_PLACEHOLDER"),
            Some(Placeholder::LastLineProgress)
        );
        assert_eq!(Placeholder::parse("_GP_SOMETHING_ELSE"), None);
    }
}

//! Sound-source description → audio prompt.
//!
//! Both builders are pure: the same description always yields the same text.
//! Prompts are capped at a fixed number of whitespace-separated words, the
//! audio model's text encoder ignoring anything past its token limit.

use scene2sound_config::PromptSettings;
use scene2sound_types::{AudioPrompt, SoundSource, SoundSourceDescription, VariantPrompt};

use crate::error::{PipelineError, Result};

/// Leading words that already act as a determiner.
const DETERMINERS: &[&str] = &[
    "a", "an", "the", "some", "many", "several", "few", "two", "three", "this", "that", "these",
    "those", "its", "their",
];

/// Uncountable sound sources that read naturally without an article.
const MASS_NOUNS: &[&str] = &[
    "rain", "water", "wind", "thunder", "traffic", "music", "applause", "snow", "fire", "steam",
    "smoke", "static", "gravel", "sand", "grass", "foliage", "machinery", "laughter", "rainfall",
    "surf", "hail",
];

/// Vowel-initial words pronounced with a leading consonant sound.
const CONSONANT_SOUND_PREFIXES: &[&str] = &["uni", "use", "usu", "uti", "eu", "one", "once"];
/// Consonant-initial words pronounced with a leading vowel sound.
const VOWEL_SOUND_PREFIXES: &[&str] = &["hour", "honest", "honor", "honour", "heir"];

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_words: usize,
}

impl PromptBuilder {
    pub fn new(settings: &PromptSettings) -> Self {
        Self {
            max_words: settings.max_prompt_words.max(1),
        }
    }

    /// One prompt for the whole image: the source labels in order, then the
    /// scene and mood when known.
    ///
    /// `{"sources": [{"label": "dog barking"}]}` becomes `"a dog barking"`.
    /// An empty description is an error; the image is skipped, never given a
    /// generic prompt.
    pub fn build(&self, desc: &SoundSourceDescription) -> Result<AudioPrompt> {
        if desc.is_empty() {
            return Err(PipelineError::EmptyDescription(desc.image_id.clone()));
        }

        let phrases: Vec<String> = desc.labels().map(with_article).collect();
        let mut text = join_phrases(&phrases);
        if let Some(scene) = &desc.scene_description {
            text.push_str(". Scene: ");
            text.push_str(scene.trim_end_matches('.'));
        }
        if let Some(mood) = &desc.mood_description {
            text.push_str(". Mood: ");
            text.push_str(mood.trim_end_matches('.'));
        }
        Ok(self.bound(text))
    }

    /// One prompt per (source, variant) pair, in description order.
    ///
    /// A source without variants contributes a single prompt built from its
    /// label alone.
    pub fn build_variants(&self, desc: &SoundSourceDescription) -> Result<Vec<VariantPrompt>> {
        if desc.is_empty() {
            return Err(PipelineError::EmptyDescription(desc.image_id.clone()));
        }

        let scene = desc
            .scene_description
            .as_deref()
            .unwrap_or("a neutral scene")
            .trim_end_matches('.');
        let mood = desc
            .mood_description
            .as_deref()
            .unwrap_or("neutral")
            .trim_end_matches('.');

        let mut prompts = Vec::new();
        for source in &desc.sources {
            if source.variants.is_empty() {
                prompts.push(VariantPrompt {
                    source_name: source.label.clone(),
                    play_method: "sound".to_string(),
                    prompt: self.bound(format!(
                        "Realistic sound effect of {}. Scene: {scene}. The sound fits a {mood} mood.",
                        with_article(&source.label)
                    )),
                });
                continue;
            }
            for variant in &source.variants {
                let play_method = variant.play_method.as_deref().unwrap_or("sound");
                let core = variant_core(source, play_method, &variant.timbre, variant.instrument());
                prompts.push(VariantPrompt {
                    source_name: source.label.clone(),
                    play_method: play_method.to_string(),
                    prompt: self.bound(format!(
                        "{core} Scene: {scene}. The sound fits a {mood} mood and does not feel out of place."
                    )),
                });
            }
        }
        Ok(prompts)
    }

    fn bound(&self, text: String) -> AudioPrompt {
        if text.split_whitespace().count() <= self.max_words {
            return AudioPrompt::new(text);
        }
        let truncated = text
            .split_whitespace()
            .take(self.max_words)
            .collect::<Vec<_>>()
            .join(" ");
        AudioPrompt::new(truncated)
    }
}

fn variant_core(
    source: &SoundSource,
    play_method: &str,
    timbre: &[String],
    instrument: Option<&str>,
) -> String {
    let material = source.material.as_deref().unwrap_or("unknown material");
    let timbre = if timbre.is_empty() {
        "natural".to_string()
    } else {
        timbre.join(", ")
    };
    let mut core = format!(
        "High-fidelity, realistic sound effect of {} made of {material}: {play_method}, with a {timbre} timbre.",
        with_article(&source.label)
    );
    match instrument {
        Some(instrument) => core.push_str(&format!(
            " Borrow the tonal character of {} for its {timbre} qualities, but keep it a natural sound, not a musical note.",
            with_article(instrument)
        )),
        None => core.push_str(
            " Clean and detailed, as if recorded in a real environment; realism over musicality.",
        ),
    }
    core
}

/// Prefix an indefinite article where English wants one.
///
/// Labels already starting with a determiner, and plural or mass-noun
/// phrases (`leaves rustling`, `rain`, `dripping water`), stay bare.
fn with_article(label: &str) -> String {
    let label = label.trim();
    let words: Vec<String> = label
        .split_whitespace()
        .map(|w| w.to_ascii_lowercase())
        .collect();
    let (Some(first), Some(last)) = (words.first(), words.last()) else {
        return String::new();
    };

    let is_determiner = DETERMINERS.contains(&first.as_str());
    // `rain`, `rain falling`, `dripping water`, but `a wind chime`.
    let is_mass = MASS_NOUNS.contains(&last.as_str())
        || (MASS_NOUNS.contains(&first.as_str())
            && words.get(1).is_none_or(|w| w.ends_with("ing")));
    if is_determiner || is_mass || is_plural(first) || is_plural(last) {
        return label.to_string();
    }
    format!("{} {label}", indefinite_article(first))
}

fn is_plural(word: &str) -> bool {
    word.len() > 3
        && word.ends_with('s')
        && !["ss", "us", "is"].iter().any(|end| word.ends_with(end))
}

fn indefinite_article(word: &str) -> &'static str {
    if VOWEL_SOUND_PREFIXES.iter().any(|p| word.starts_with(p)) {
        return "an";
    }
    if CONSONANT_SOUND_PREFIXES.iter().any(|p| word.starts_with(p)) {
        return "a";
    }
    match word.chars().next() {
        Some(c) if "aeiou".contains(c) => "an",
        _ => "a",
    }
}

/// `x`, `x and y`, `x, y and z`.
fn join_phrases(phrases: &[String]) -> String {
    match phrases {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene2sound_types::SoundVariant;

    fn builder(max_words: usize) -> PromptBuilder {
        PromptBuilder::new(&PromptSettings {
            max_prompt_words: max_words,
        })
    }

    fn labels(id: &str, labels: &[&str]) -> SoundSourceDescription {
        SoundSourceDescription::new(
            id,
            labels.iter().map(|l| SoundSource::labelled(*l)).collect(),
        )
    }

    #[test]
    fn test_single_label() {
        let prompt = builder(70).build(&labels("101", &["dog barking"])).unwrap();
        assert_eq!(prompt.as_str(), "a dog barking");
    }

    #[test]
    fn test_join_and_articles() {
        let desc = labels("1", &["owl hooting", "the river", "engine idling"]);
        let prompt = builder(70).build(&desc).unwrap();
        assert_eq!(
            prompt.as_str(),
            "an owl hooting, the river and an engine idling"
        );
    }

    #[test]
    fn test_scene_and_mood_appended() {
        let mut desc = labels("1", &["rain"]);
        desc.scene_description = Some("A city street at night.".into());
        desc.mood_description = Some("calm".into());
        let prompt = builder(70).build(&desc).unwrap();
        assert_eq!(prompt.as_str(), "rain. Scene: A city street at night. Mood: calm");
    }

    #[test]
    fn test_articles() {
        assert_eq!(with_article("unicorn"), "a unicorn");
        assert_eq!(with_article("hour hand ticking"), "an hour hand ticking");
        assert_eq!(with_article("umbrella"), "an umbrella");
        assert_eq!(with_article("rain"), "rain");
        assert_eq!(with_article("rain falling"), "rain falling");
        assert_eq!(with_article("wind chime"), "a wind chime");
        assert_eq!(with_article("leaves rustling"), "leaves rustling");
        assert_eq!(with_article("dripping water"), "dripping water");
        assert_eq!(with_article("glass bottle"), "a glass bottle");
        assert_eq!(with_article("bus idling"), "a bus idling");
        assert_eq!(with_article("distant thunder"), "distant thunder");
        assert_eq!(with_article("ceiling fan"), "a ceiling fan");
        assert_eq!(with_article("footsteps on gravel"), "footsteps on gravel");
        assert_eq!(with_article("owl hooting"), "an owl hooting");
        assert_eq!(with_article("The river"), "The river");
    }

    #[test]
    fn test_build_is_deterministic() {
        let desc = labels("1", &["bell", "wind"]);
        let b = builder(70);
        assert_eq!(b.build(&desc).unwrap(), b.build(&desc).unwrap());
    }

    #[test]
    fn test_empty_description_is_skipped() {
        let err = builder(70).build(&labels("102", &[])).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDescription(ref id) if id == "102"));
        assert!(builder(70).build_variants(&labels("102", &[])).is_err());
    }

    #[test]
    fn test_prompt_is_bounded() {
        let many: Vec<String> = (0..50).map(|i| format!("source{i}")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let prompt = builder(10).build(&labels("1", &refs)).unwrap();
        assert_eq!(prompt.word_count(), 10);
        assert!(prompt.as_str().starts_with("a source0, a source1"));
    }

    #[test]
    fn test_variant_prompts() {
        let mut source = SoundSource::labelled("glass bottle");
        source.material = Some("glass".into());
        source.variants = vec![
            SoundVariant {
                play_method: Some("tap".into()),
                timbre: vec!["bright".into(), "ringing".into()],
                mapping_to_music_instrument: Some("keyboard".into()),
                confidence: Some(0.9),
            },
            SoundVariant {
                play_method: Some("roll".into()),
                timbre: vec![],
                mapping_to_music_instrument: Some("None".into()),
                confidence: None,
            },
        ];
        let mut desc = SoundSourceDescription::new("5", vec![source, SoundSource::labelled("fan")]);
        desc.mood_description = Some("cozy".into());

        let prompts = builder(200).build_variants(&desc).unwrap();
        assert_eq!(prompts.len(), 3);
        assert_eq!(prompts[0].play_method, "tap");
        assert!(prompts[0].prompt.as_str().contains("tonal character of a keyboard"));
        assert!(prompts[1].prompt.as_str().contains("realism over musicality"));
        assert!(prompts[1].prompt.as_str().contains("natural timbre"));
        assert_eq!(prompts[2].source_name, "fan");
        assert!(prompts[2].prompt.as_str().contains("a neutral scene"));
        assert!(prompts.iter().all(|p| p.prompt.as_str().contains("cozy")));
    }
}

//! Image prompt generators: word-list templates or an LLM.

use std::sync::Arc;

use indoc::indoc;
use strum::{Display, EnumString};

use crate::core::utils::{pick, truncate_chars};
use crate::llm::{ChatMessage, ChatModel, ChatRequest};

/// Stable Diffusion prompts longer than this get truncated
pub const MAX_PROMPT_CHARS: usize = 400;

const OBJECTS: [&str; 12] = [
    "cyberpunk cat",
    "vibrant galaxy",
    "steampunk owl",
    "surreal landscape",
    "anime warrior",
    "bioorganic structure",
    "futuristic cityscape",
    "psychedelic unicorn",
    "robotic samurai",
    "crystal cavern",
    "apocalyptic wasteland",
    "enchanted forest",
];

const STYLES: [&str; 15] = [
    "digital painting",
    "concept art",
    "octane render",
    "unreal engine",
    "cyberpunk 2077 style",
    "synthwave",
    "low poly",
    "isometric",
    "glitch art",
    "luminous",
    "hyperrealistic",
    "watercolor",
    "ink illustration",
    "retro futurism",
    "3D render",
];

const COLORS: [&str; 12] = [
    "vivid neon",
    "monochrome",
    "pastel gradient",
    "electric tones",
    "metallic sheen",
    "dark contrast",
    "warm sunset",
    "cyber violet",
    "holographic",
    "bioluminescent",
    "gold accents",
    "chrome",
];

const LOCATIONS: [&str; 11] = [
    "floating islands",
    "neon metropolis",
    "underwater ruins",
    "cyberspace matrix",
    "alien marketplace",
    "crystal desert",
    "volcanic forge",
    "nebula core",
    "haunted cathedral",
    "quantum realm",
    "neural network",
];

const DETAILS: [&str; 11] = [
    "intricate details",
    "dynamic lighting",
    "volumetric fog",
    "particle effects",
    "cinematic composition",
    "4k resolution",
    "hyperdetailed textures",
    "ray tracing",
    "motion blur",
    "depth of field",
    "symmetrical patterns",
];

const MODIFIERS: [&str; 6] = [
    "trending on artstation",
    "ultra HD",
    "8k resolution",
    "unreal engine 5",
    "nvidia ray tracing",
    "epic composition",
];

const CONCEPT_LOCATIONS: [&str; 6] = [
    "abandoned quantum server farm",
    "floating arcology district",
    "cryo-preserved fashion vault",
    "neon-drenched tech slums",
    "underground bio-hacker den",
    "derelict space elevator terminal",
];

const TECH_MODIFIERS: [&str; 6] = [
    "with adaptive nano-textiles",
    "featuring quantum dot illumination",
    "using photonic lattice structures",
    "with biomimetic surface patterns",
    "incorporating ferrofluid dynamics",
    "with chameleon pigment technology",
];

const SYSTEM_PROMPT: &str = indoc! {r#"
    Generate a SINGLE cohesive Stable Diffusion prompt in English (200-400 characters) describing futuristic scenes for 2025.
    Requirements:
    - Single continuous text without sections/bullets
    - Include: environment, tech details, materials, lighting
    - Focus on visual adjectives
    - Style: photorealistic/sci-fi art
    - No markdown/titles/separators

    Example: "A sprawling underground tech-bazaar in 2025 Neo-Moscow, where glowing nano-fabric stalls illuminate crumbling Soviet-era architecture, holographic fashion shows project onto smoke-filled air, cyborg merchants display liquid-metal garments that ripple like mercury, neon lasers slice through industrial fog, 8k ultra-detailed with cinematic cyberpunk lighting, depth of field, trending on ArtStation"."#};

const FALLBACK_ELEMENTS: [&str; 24] = [
    "A dystopian fashion hub in 2025 where",
    "neon-lit",
    "holographic",
    "biomechanical",
    "nano-enhanced",
    "garments",
    "interact with",
    "quantum computing nodes",
    "projected onto",
    "crumbling concrete structures",
    "amidst",
    "floating AR advertisements",
    "cybernetic",
    "models with",
    "glowing circuitry",
    "under",
    "pulsing UV arrays",
    "rendered in",
    "hyper-realistic 8k detail",
    "with",
    "volumetric fog effects",
    "and",
    "cinematic depth of field",
    "trending on ArtStation",
];

/// Which generator the pipeline uses (`PROMPT_TYPE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum PromptKind {
    Simple,
    GigaChat,
}

fn any<'a>(items: &[&'a str]) -> &'a str {
    pick(items).copied().unwrap_or_default()
}

/// Random template prompt, at most 400 characters.
pub fn simple_prompt() -> String {
    let first = any(&DETAILS);
    let others: Vec<&str> = DETAILS.iter().copied().filter(|d| *d != first).collect();
    let second = any(&others);

    let prompt = format!(
        "A {} in {}, {}, {} palette, {}, {}, {}",
        any(&OBJECTS),
        any(&LOCATIONS),
        any(&STYLES),
        any(&COLORS),
        first,
        second,
        any(&MODIFIERS)
    );

    let length = prompt.chars().count();
    if length > MAX_PROMPT_CHARS {
        log::warn!("Prompt truncated from {} to {} characters", length, MAX_PROMPT_CHARS);
    }
    let result = truncate_chars(&prompt, MAX_PROMPT_CHARS);
    log::debug!("Generated simple prompt: {}", result);
    result
}

/// Random seed concept for the LLM
pub fn base_concept() -> String {
    format!("{} {}", any(&CONCEPT_LOCATIONS), any(&TECH_MODIFIERS))
}

/// Strips markdown leftovers and joins lines into a single prompt.
pub fn clean_prompt(text: &str) -> String {
    let cleaned = lazy_regex::regex_replace_all!(r"\*\*|#|[-•]|\[|\]|\{:|\}", text, "");
    let joined = cleaned.split('\n').collect::<Vec<_>>().join(" ");
    truncate_chars(joined.trim(), MAX_PROMPT_CHARS)
        .trim_end_matches([',', '.', ' '])
        .to_string()
}

/// Deterministic prompt used when the LLM is unavailable.
pub fn fallback_prompt() -> String {
    truncate_chars(&FALLBACK_ELEMENTS.join(" "), MAX_PROMPT_CHARS)
}

/// Produces one image prompt per pipeline cycle.
#[derive(Clone)]
pub enum PromptGenerator {
    Simple,
    GigaChat(Arc<dyn ChatModel>),
}

impl PromptGenerator {
    /// Generator for `kind`; GigaChat without a chat model degrades to Simple.
    pub fn new(kind: PromptKind, chat: Option<Arc<dyn ChatModel>>) -> Self {
        match (kind, chat) {
            (PromptKind::GigaChat, Some(chat)) => Self::GigaChat(chat),
            (PromptKind::GigaChat, None) => {
                log::warn!("GIGACHAT prompt generator requested without credentials, using SIMPLE");
                Self::Simple
            }
            (PromptKind::Simple, _) => Self::Simple,
        }
    }

    pub fn kind(&self) -> PromptKind {
        match self {
            Self::Simple => PromptKind::Simple,
            Self::GigaChat(_) => PromptKind::GigaChat,
        }
    }

    pub async fn generate(&self) -> String {
        log::info!("Using {} prompt generator", self.kind());
        let prompt = match self {
            Self::Simple => simple_prompt(),
            Self::GigaChat(chat) => llm_prompt(chat.as_ref(), &base_concept()).await,
        };
        log::info!("📝 Prompt: {}", prompt);
        prompt
    }
}

/// Asks the LLM to expand `concept`; falls back to a fixed prompt on error.
pub async fn llm_prompt(chat: &dyn ChatModel, concept: &str) -> String {
    let request = ChatRequest::new(vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("Concept: {}", concept)),
    ])
    .temperature(0.75)
    .max_tokens(450);

    match chat.complete(&request).await {
        Ok(text) => clean_prompt(&text),
        Err(e) => {
            log::error!("GigaChat API error: {}", e);
            let fallback = fallback_prompt();
            log::warn!("Using fallback prompt: {}", fallback);
            fallback
        }
    }
}

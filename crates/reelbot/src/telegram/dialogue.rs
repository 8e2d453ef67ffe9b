//! Per-chat conversation state
//!
//! The image parameter dialog, the audio prompt and the YouTube code prompt
//! are small state machines. [`DialogState::on_input`] is pure: it maps the
//! current state and the user's text to a [`Transition`] and the handlers
//! perform whatever side effects the transition asks for.

use dashmap::DashMap;
use lazy_regex::regex_captures;
use reelcore::diffusion::Txt2ImgParams;
use reelcore::upload::PendingUpload;

use super::keyboards::{
    BTN_BACK, BTN_CFG, BTN_FACES, BTN_FACES_OFF, BTN_FACES_ON, BTN_GENERATE, BTN_NEGATIVE, BTN_QUANTITY,
    BTN_SAMPLER, BTN_SIZE, BTN_STEPS, SIZES,
};

pub const TXT_START_GENERATION: &str = "Введите описание для генерации изображения:";
pub const TXT_CHOOSE_PARAMS: &str = "Настройте параметры:";
pub const TXT_CHOOSE_SIZE: &str = "Выберите размер изображения:";
pub const TXT_ENTER_QUANTITY: &str = "Введите количество изображений (от 1 до 100):";
pub const TXT_ENTER_STEPS: &str = "Введите количество шагов (1-150):";
pub const TXT_ENTER_CFG: &str = "Введите значение CFG Scale (1-30):";
pub const TXT_ENTER_SAMPLER: &str = "Введите название сэмплера:";
pub const TXT_ENTER_NEGATIVE: &str = "Введите отрицательный промпт:";
pub const TXT_CHOOSE_FACES: &str = "Восстановление лиц:";
pub const TXT_CANCELLED: &str = "Генерация отменена";
pub const TXT_EMPTY_PROMPT: &str = "Описание не может быть пустым. Введите описание для генерации изображения:";
pub const TXT_BAD_SIZE: &str = "Выберите размер с клавиатуры";

pub const MAX_QUANTITY: u32 = 100;
pub const MAX_STEPS: u32 = 150;
pub const MAX_CFG: f32 = 30.0;

/// Prompt plus the parameters collected so far.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDraft {
    pub params: Txt2ImgParams,
}

impl ImageDraft {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            params: Txt2ImgParams::with_prompt(prompt),
        }
    }

    /// Human-readable parameter list shown before generation.
    pub fn summary(&self) -> String {
        let p = &self.params;
        format!(
            "Промпт: {}\nРазмер: {}x{}\nКоличество: {}\nШаги: {}\nCFG Scale: {}\nСэмплер: {}\nОтрицательный промпт: {}\nВосстановление лиц: {}",
            p.prompt,
            p.width,
            p.height,
            p.n_iter,
            p.steps,
            p.cfg_scale,
            p.sampler_name,
            p.negative_prompt,
            if p.restore_faces { "да" } else { "нет" },
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogState {
    WaitingPrompt,
    ChoosingParameters(ImageDraft),
    SettingSize(ImageDraft),
    SettingQuantity(ImageDraft),
    SettingSteps(ImageDraft),
    SettingCfg(ImageDraft),
    SettingSampler(ImageDraft),
    SettingNegative(ImageDraft),
    SettingFaces(ImageDraft),
    WaitingAudioText,
    /// The OAuth link was sent; the next text is the authorization code
    WaitingAuthCode { pending: Option<PendingUpload> },
}

/// Which keyboard accompanies a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKeyboard {
    Parameters,
    Size,
    Faces,
    /// Samplers are fetched from the backend when the keyboard is built
    Samplers,
    Back,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub keyboard: ReplyKeyboard,
}

impl Reply {
    fn new(text: impl Into<String>, keyboard: ReplyKeyboard) -> Self {
        Self {
            text: text.into(),
            keyboard,
        }
    }

    fn params(text: impl Into<String>) -> Self {
        Self::new(text, ReplyKeyboard::Parameters)
    }
}

/// What the handler should do with the user's input.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Store `state` and send `reply`
    Move(DialogState, Reply),
    Generate(ImageDraft),
    Synthesize(String),
    ExchangeCode { code: String, pending: Option<PendingUpload> },
    /// Clear the state and return to the main menu
    Cancel,
}

fn is_cancel(input: &str) -> bool {
    input == "/cancel" || input.to_lowercase() == "отмена"
}

/// Accepts the bare code or the whole redirect URL the browser ended up on.
pub fn extract_auth_code(input: &str) -> String {
    match regex_captures!(r"[?&]code=([^&#\s]+)", input) {
        Some((_, code)) => code.to_string(),
        None => input.to_string(),
    }
}

/// Only the sizes offered on the keyboard are accepted.
fn parse_size(input: &str) -> Option<(u32, u32)> {
    let label = SIZES.iter().find(|label| **label == input)?;
    let (w, h) = label.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

fn parse_in_range(input: &str, max: u32) -> Option<u32> {
    input.trim().parse::<u32>().ok().filter(|v| (1..=max).contains(v))
}

fn parse_cfg(input: &str) -> Option<f32> {
    input
        .trim()
        .replace(',', ".")
        .parse::<f32>()
        .ok()
        .filter(|v| (1.0..=MAX_CFG).contains(v))
}

impl DialogState {
    pub fn on_input(&self, input: &str) -> Transition {
        let input = input.trim();
        if is_cancel(input) {
            return Transition::Cancel;
        }

        match self {
            Self::WaitingPrompt => {
                if input == BTN_BACK {
                    return Transition::Cancel;
                }
                if input.is_empty() {
                    return Transition::Move(Self::WaitingPrompt, Reply::new(TXT_EMPTY_PROMPT, ReplyKeyboard::Back));
                }
                Transition::Move(Self::ChoosingParameters(ImageDraft::new(input)), Reply::params(TXT_CHOOSE_PARAMS))
            }
            Self::ChoosingParameters(draft) => choose_parameter(draft, input),
            Self::WaitingAudioText => {
                if input.is_empty() {
                    return Transition::Cancel;
                }
                Transition::Synthesize(input.to_string())
            }
            Self::WaitingAuthCode { pending } => Transition::ExchangeCode {
                code: extract_auth_code(input),
                pending: pending.clone(),
            },
            Self::SettingSize(draft)
            | Self::SettingQuantity(draft)
            | Self::SettingSteps(draft)
            | Self::SettingCfg(draft)
            | Self::SettingSampler(draft)
            | Self::SettingNegative(draft)
            | Self::SettingFaces(draft)
                if input == BTN_BACK =>
            {
                Transition::Move(Self::ChoosingParameters(draft.clone()), Reply::params(TXT_CHOOSE_PARAMS))
            }
            Self::SettingSize(draft) => match parse_size(input) {
                Some((width, height)) => {
                    let mut draft = draft.clone();
                    draft.params.width = width;
                    draft.params.height = height;
                    set(draft, format!("Установлен размер: {}x{}", width, height))
                }
                None => Transition::Move(self.clone(), Reply::new(TXT_BAD_SIZE, ReplyKeyboard::Size)),
            },
            Self::SettingQuantity(draft) => match parse_in_range(input, MAX_QUANTITY) {
                Some(n) => {
                    let mut draft = draft.clone();
                    draft.params.n_iter = n;
                    set(draft, format!("Установлено количество: {}", n))
                }
                None => invalid(self, MAX_QUANTITY),
            },
            Self::SettingSteps(draft) => match parse_in_range(input, MAX_STEPS) {
                Some(steps) => {
                    let mut draft = draft.clone();
                    draft.params.steps = steps;
                    set(draft, format!("Установлено шагов: {}", steps))
                }
                None => invalid(self, MAX_STEPS),
            },
            Self::SettingCfg(draft) => match parse_cfg(input) {
                Some(cfg) => {
                    let mut draft = draft.clone();
                    draft.params.cfg_scale = cfg;
                    set(draft, format!("Установлен CFG Scale: {}", cfg))
                }
                None => invalid(self, MAX_CFG as u32),
            },
            Self::SettingSampler(draft) => {
                if input.is_empty() {
                    return Transition::Move(self.clone(), Reply::new(TXT_ENTER_SAMPLER, ReplyKeyboard::Samplers));
                }
                let mut draft = draft.clone();
                draft.params.sampler_name = input.to_string();
                set(draft, format!("Установлен сэмплер: {}", input))
            }
            Self::SettingNegative(draft) => {
                let mut draft = draft.clone();
                draft.params.negative_prompt = input.to_string();
                set(draft, format!("Установлен отрицательный промпт: {}", input))
            }
            Self::SettingFaces(draft) => {
                let enabled = match input {
                    BTN_FACES_ON => true,
                    BTN_FACES_OFF => false,
                    _ => return Transition::Move(self.clone(), Reply::new(TXT_CHOOSE_FACES, ReplyKeyboard::Faces)),
                };
                let mut draft = draft.clone();
                draft.params.restore_faces = enabled;
                let text = if enabled {
                    "Восстановление лиц включено ✅"
                } else {
                    "Восстановление лиц выключено ❌"
                };
                set(draft, text)
            }
        }
    }
}

fn choose_parameter(draft: &ImageDraft, input: &str) -> Transition {
    let draft = draft.clone();
    match input {
        BTN_SIZE => Transition::Move(DialogState::SettingSize(draft), Reply::new(TXT_CHOOSE_SIZE, ReplyKeyboard::Size)),
        BTN_QUANTITY => Transition::Move(
            DialogState::SettingQuantity(draft),
            Reply::new(TXT_ENTER_QUANTITY, ReplyKeyboard::Back),
        ),
        BTN_STEPS => Transition::Move(DialogState::SettingSteps(draft), Reply::new(TXT_ENTER_STEPS, ReplyKeyboard::Back)),
        BTN_CFG => Transition::Move(DialogState::SettingCfg(draft), Reply::new(TXT_ENTER_CFG, ReplyKeyboard::Back)),
        BTN_SAMPLER => Transition::Move(
            DialogState::SettingSampler(draft),
            Reply::new(TXT_ENTER_SAMPLER, ReplyKeyboard::Samplers),
        ),
        BTN_NEGATIVE => Transition::Move(
            DialogState::SettingNegative(draft),
            Reply::new(TXT_ENTER_NEGATIVE, ReplyKeyboard::Back),
        ),
        BTN_FACES => Transition::Move(DialogState::SettingFaces(draft), Reply::new(TXT_CHOOSE_FACES, ReplyKeyboard::Faces)),
        BTN_GENERATE => Transition::Generate(draft),
        BTN_BACK => Transition::Move(DialogState::WaitingPrompt, Reply::new(TXT_START_GENERATION, ReplyKeyboard::Back)),
        _ => Transition::Move(DialogState::ChoosingParameters(draft), Reply::params(TXT_CHOOSE_PARAMS)),
    }
}

fn set(draft: ImageDraft, text: impl Into<String>) -> Transition {
    Transition::Move(DialogState::ChoosingParameters(draft), Reply::params(text))
}

fn invalid(state: &DialogState, max: u32) -> Transition {
    Transition::Move(
        state.clone(),
        Reply::new(
            format!("Некорректное значение! Введите число от 1 до {}", max),
            ReplyKeyboard::Back,
        ),
    )
}

/// Dialog states and uploads waiting for authorization, keyed by chat id.
#[derive(Default)]
pub struct DialogStore {
    states: DashMap<i64, DialogState>,
    pending_uploads: DashMap<i64, PendingUpload>,
}

impl DialogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chat_id: i64) -> Option<DialogState> {
        self.states.get(&chat_id).map(|state| state.clone())
    }

    pub fn set(&self, chat_id: i64, state: DialogState) {
        self.states.insert(chat_id, state);
    }

    pub fn clear(&self, chat_id: i64) -> Option<DialogState> {
        self.states.remove(&chat_id).map(|(_, state)| state)
    }

    /// Keeps a video that could not be uploaded until the chat authorizes.
    pub fn remember_upload(&self, chat_id: i64, pending: PendingUpload) {
        log::info!("Keeping {} for upload after authorization", pending.video.display());
        self.pending_uploads.insert(chat_id, pending);
    }

    pub fn take_upload(&self, chat_id: i64) -> Option<PendingUpload> {
        self.pending_uploads.remove(&chat_id).map(|(_, pending)| pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reelcore::upload::VideoMetadata;
    use std::path::PathBuf;

    #[test]
    fn test_auth_code_from_redirect_url() {
        assert_eq!(
            extract_auth_code("http://localhost/?state=x&code=4/0AbCd-e_f&scope=youtube.upload"),
            "4/0AbCd-e_f"
        );
        assert_eq!(extract_auth_code("4/0AbCd"), "4/0AbCd");
    }

    fn choosing() -> DialogState {
        DialogState::ChoosingParameters(ImageDraft::new("неоновый кот"))
    }

    fn moved_to(transition: Transition) -> (DialogState, Reply) {
        match transition {
            Transition::Move(state, reply) => (state, reply),
            other => panic!("expected a move, got {other:?}"),
        }
    }

    fn draft_of(state: &DialogState) -> &ImageDraft {
        match state {
            DialogState::ChoosingParameters(draft) => draft,
            other => panic!("expected ChoosingParameters, got {other:?}"),
        }
    }

    #[test]
    fn test_prompt_starts_parameter_selection_with_defaults() {
        let (state, reply) = moved_to(DialogState::WaitingPrompt.on_input("  неоновый кот "));

        let draft = draft_of(&state);
        assert_eq!(draft.params.prompt, "неоновый кот");
        assert_eq!(draft.params.steps, 25);
        assert_eq!((draft.params.width, draft.params.height), (512, 768));
        assert_eq!(reply.text, TXT_CHOOSE_PARAMS);
        assert_eq!(reply.keyboard, ReplyKeyboard::Parameters);
    }

    #[test]
    fn test_cancel_from_any_state() {
        for state in [
            DialogState::WaitingPrompt,
            choosing(),
            DialogState::SettingSteps(ImageDraft::new("x")),
            DialogState::WaitingAudioText,
            DialogState::WaitingAuthCode { pending: None },
        ] {
            assert_eq!(state.on_input("/cancel"), Transition::Cancel);
            assert_eq!(state.on_input("Отмена"), Transition::Cancel);
        }
    }

    #[test]
    fn test_size_is_applied() {
        let (state, _) = moved_to(choosing().on_input(BTN_SIZE));
        assert!(matches!(state, DialogState::SettingSize(_)));

        let (state, reply) = moved_to(state.on_input("1024x1024"));
        let draft = draft_of(&state);
        assert_eq!((draft.params.width, draft.params.height), (1024, 1024));
        assert_eq!(reply.text, "Установлен размер: 1024x1024");
    }

    #[test]
    fn test_size_outside_keyboard_is_rejected() {
        let state = DialogState::SettingSize(ImageDraft::new("x"));
        for input in ["4096x4096", "99999x1", "512x768", "512х512"] {
            let (next, reply) = moved_to(state.on_input(input));
            assert_eq!(next, state);
            assert_eq!(reply.text, TXT_BAD_SIZE);
            assert_eq!(reply.keyboard, ReplyKeyboard::Size);
        }
    }

    #[test]
    fn test_quantity_out_of_range_stays_in_state() {
        let state = DialogState::SettingQuantity(ImageDraft::new("x"));

        let (next, reply) = moved_to(state.on_input("101"));
        assert_eq!(next, state);
        assert_eq!(reply.text, "Некорректное значение! Введите число от 1 до 100");

        let (next, _) = moved_to(state.on_input("abc"));
        assert_eq!(next, state);

        let (next, reply) = moved_to(state.on_input("4"));
        assert_eq!(draft_of(&next).params.n_iter, 4);
        assert_eq!(reply.text, "Установлено количество: 4");
    }

    #[test]
    fn test_steps_and_cfg_bounds() {
        let steps = DialogState::SettingSteps(ImageDraft::new("x"));
        assert_eq!(
            moved_to(steps.on_input("0")).1.text,
            "Некорректное значение! Введите число от 1 до 150"
        );
        assert_eq!(draft_of(&moved_to(steps.on_input("150")).0).params.steps, 150);

        let cfg = DialogState::SettingCfg(ImageDraft::new("x"));
        assert_eq!(
            moved_to(cfg.on_input("31")).1.text,
            "Некорректное значение! Введите число от 1 до 30"
        );
        assert_eq!(draft_of(&moved_to(cfg.on_input("6,5")).0).params.cfg_scale, 6.5);
    }

    #[test]
    fn test_faces_toggle() {
        let state = DialogState::SettingFaces(ImageDraft::new("x"));

        let (next, reply) = moved_to(state.on_input(BTN_FACES_ON));
        assert!(draft_of(&next).params.restore_faces);
        assert_eq!(reply.text, "Восстановление лиц включено ✅");

        let (next, _) = moved_to(state.on_input("может быть"));
        assert_eq!(next, state);
    }

    #[test]
    fn test_back_from_sub_state_keeps_draft() {
        let mut draft = ImageDraft::new("x");
        draft.params.steps = 40;
        let (next, reply) = moved_to(DialogState::SettingNegative(draft.clone()).on_input(BTN_BACK));

        assert_eq!(next, DialogState::ChoosingParameters(draft));
        assert_eq!(reply.text, TXT_CHOOSE_PARAMS);
    }

    #[test]
    fn test_back_from_parameters_asks_for_prompt_again() {
        let (next, reply) = moved_to(choosing().on_input(BTN_BACK));
        assert_eq!(next, DialogState::WaitingPrompt);
        assert_eq!(reply.text, TXT_START_GENERATION);
    }

    #[test]
    fn test_generate_hands_over_the_draft() {
        let transition = choosing().on_input(BTN_GENERATE);
        assert_eq!(transition, Transition::Generate(ImageDraft::new("неоновый кот")));
    }

    #[test]
    fn test_auth_code_carries_pending_upload() {
        let pending = PendingUpload {
            video: PathBuf::from("output/video/video_0.mp4"),
            metadata: VideoMetadata {
                title: "t".to_string(),
                description: "d".to_string(),
            },
        };
        let state = DialogState::WaitingAuthCode {
            pending: Some(pending.clone()),
        };

        assert_eq!(
            state.on_input(" 4/0AX4XfWh "),
            Transition::ExchangeCode {
                code: "4/0AX4XfWh".to_string(),
                pending: Some(pending),
            }
        );
    }

    #[test]
    fn test_store_roundtrip() {
        let store = DialogStore::new();
        store.set(7, DialogState::WaitingAudioText);

        assert_eq!(store.get(7), Some(DialogState::WaitingAudioText));
        assert_eq!(store.clear(7), Some(DialogState::WaitingAudioText));
        assert_eq!(store.get(7), None);
        assert_eq!(store.take_upload(7), None);
    }
}

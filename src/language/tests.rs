use super::*;
use std::sync::Mutex;

type Call = (String, LangCode, LangCode);

/// Echoes a fixed reply per direction and records every request
#[derive(Default)]
struct RecordingTranslator {
    calls: Mutex<Vec<Call>>,
    fail: bool,
}

impl RecordingTranslator {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock").clone()
    }
}

impl Translator for RecordingTranslator {
    fn translate(&self, text: &str, source: LangCode, target: LangCode) -> crate::Result<String> {
        self.calls
            .lock()
            .expect("lock")
            .push((text.to_string(), source, target));
        if self.fail {
            return Err(QaError::Translation("service unavailable".to_string()));
        }
        Ok(match target {
            LangCode::English => "What is this book about?".to_string(),
            LangCode::Manipuri => "ꯂꯥꯏꯔꯤꯛ".to_string(),
        })
    }
}

struct FixedDetector(Detection);

impl LanguageDetector for FixedDetector {
    fn detect(&self, _text: &str) -> Detection {
        self.0
    }
}

fn normalizer(
    detection: Detection,
    translator: Arc<RecordingTranslator>,
    routing: NonEnglishRouting,
) -> LanguageNormalizer {
    LanguageNormalizer::new(
        Box::new(FixedDetector(detection)),
        Arc::new(ManipuriLexicon::default()),
        translator,
        routing,
    )
}

#[test]
fn lexicon_beats_detector() {
    let translator = Arc::new(RecordingTranslator::default());
    let normalizer = normalizer(
        Detection::English,
        Arc::clone(&translator),
        NonEnglishRouting::Manipuri,
    );

    let query = normalizer
        .normalize("houjikti nahakki thouram kari?")
        .expect("normalizes");

    assert_eq!(query.state, LanguageState::RomanizedManipuri);
    assert_eq!(query.english, "What is this book about?");
    assert_eq!(query.native.as_deref(), Some("ꯍꯧꯖꯤꯛꯇꯤ ꯅꯍꯛꯀꯤ ꯊꯧꯔꯝ ꯀꯔꯤ?"));
    assert_eq!(
        translator.calls(),
        vec![(
            "ꯍꯧꯖꯤꯛꯇꯤ ꯅꯍꯛꯀꯤ ꯊꯧꯔꯝ ꯀꯔꯤ?".to_string(),
            LangCode::Manipuri,
            LangCode::English
        )]
    );
}

#[test]
fn english_passes_through_untranslated() {
    let translator = Arc::new(RecordingTranslator::default());
    let normalizer = normalizer(
        Detection::English,
        Arc::clone(&translator),
        NonEnglishRouting::Manipuri,
    );

    let query = normalizer
        .normalize("  Who wrote this report?  ")
        .expect("normalizes");

    assert_eq!(query.state, LanguageState::English);
    assert_eq!(query.english, "Who wrote this report?");
    assert!(query.native.is_none());
    assert!(translator.calls().is_empty());
}

#[test]
fn native_script_skips_transliteration() {
    let translator = Arc::new(RecordingTranslator::default());
    let normalizer = normalizer(
        Detection::MeeteiMayek,
        Arc::clone(&translator),
        NonEnglishRouting::Manipuri,
    );

    let query = normalizer.normalize("ꯂꯥꯏꯔꯤꯛ ꯀꯔꯤ").expect("normalizes");
    assert_eq!(query.state, LanguageState::NativeManipuri);
    assert_eq!(translator.calls()[0].0, "ꯂꯥꯏꯔꯤꯛ ꯀꯔꯤ");
}

#[test]
fn non_english_routing_is_configurable() {
    let translator = Arc::new(RecordingTranslator::default());

    let manipuri = normalizer(
        Detection::NonEnglish,
        Arc::clone(&translator),
        NonEnglishRouting::Manipuri,
    );
    assert_eq!(manipuri.classify("lairik asi"), LanguageState::RomanizedManipuri);

    let passthrough = normalizer(
        Detection::NonEnglish,
        Arc::clone(&translator),
        NonEnglishRouting::Passthrough,
    );
    let query = passthrough.normalize("lairik asi").expect("normalizes");
    assert_eq!(query.state, LanguageState::Other);
    assert_eq!(query.english, "lairik asi");
    assert!(translator.calls().is_empty());
}

#[test]
fn other_scripts_are_never_translated() {
    let translator = Arc::new(RecordingTranslator::default());
    let normalizer = normalizer(
        Detection::OtherScript,
        Arc::clone(&translator),
        NonEnglishRouting::Manipuri,
    );

    let query = normalizer.normalize("এই বইটি কী নিয়ে?").expect("normalizes");
    assert_eq!(query.state, LanguageState::Other);
    assert_eq!(
        normalizer
            .reverse("An answer", query.state)
            .expect("reverse succeeds"),
        None
    );
    assert!(translator.calls().is_empty());
}

#[test]
fn translation_failure_aborts() {
    let translator = Arc::new(RecordingTranslator::failing());
    let normalizer = normalizer(
        Detection::English,
        Arc::clone(&translator),
        NonEnglishRouting::Manipuri,
    );

    let result = normalizer.normalize("houjikti nahakki thouram kari?");
    assert!(matches!(result, Err(QaError::Translation(_))));

    let reversed = normalizer.reverse("An answer", LanguageState::RomanizedManipuri);
    assert!(matches!(reversed, Err(QaError::Translation(_))));
}

#[test]
fn reverse_romanizes_the_translation() {
    let translator = Arc::new(RecordingTranslator::default());
    let normalizer = normalizer(
        Detection::English,
        Arc::clone(&translator),
        NonEnglishRouting::Manipuri,
    );

    let reversed = normalizer
        .reverse("It is a book.", LanguageState::NativeManipuri)
        .expect("reverse succeeds");
    assert_eq!(reversed.as_deref(), Some("laairik"));
    assert_eq!(
        translator.calls(),
        vec![(
            "It is a book.".to_string(),
            LangCode::English,
            LangCode::Manipuri
        )]
    );

    assert_eq!(
        normalizer
            .reverse("It is a book.", LanguageState::English)
            .expect("english needs nothing"),
        None
    );
}

#[test]
fn empty_query_is_an_input_error() {
    let normalizer = normalizer(
        Detection::English,
        Arc::new(RecordingTranslator::default()),
        NonEnglishRouting::Manipuri,
    );
    assert!(matches!(normalizer.normalize("   "), Err(QaError::Input(_))));
}

#[test]
fn whatlang_detector_scripts() {
    let detector = WhatlangDetector;

    assert_eq!(detector.detect("ꯂꯥꯏꯔꯤꯛ ꯀꯔꯤ?"), Detection::MeeteiMayek);
    assert_eq!(detector.detect("এই বইটি কী নিয়ে লেখা?"), Detection::OtherScript);
    assert_eq!(detector.detect("42 ?!"), Detection::Unknown);
}

#[test]
fn whatlang_detector_languages() {
    let detector = WhatlangDetector;

    assert_eq!(
        detector.detect(
            "The report describes how the committee reviewed the budget and which projects \
             it decided to fund during the coming year."
        ),
        Detection::English
    );
    assert_eq!(
        detector.detect(
            "Le rapport décrit comment le comité a examiné le budget et quels projets il a \
             décidé de financer pendant l'année prochaine."
        ),
        Detection::NonEnglish
    );
}

#[test]
fn language_state_serde_names() {
    assert_eq!(
        serde_json::to_string(&LanguageState::RomanizedManipuri).expect("serializes"),
        "\"romanized_manipuri\""
    );
    assert_eq!(LanguageState::NativeManipuri.to_string(), "native_manipuri");
    assert!(LanguageState::NativeManipuri.is_manipuri());
    assert!(!LanguageState::Other.is_manipuri());
}

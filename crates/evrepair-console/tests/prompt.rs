use evrepair_console::{Key, KeyInput, PromptError, Prompter, Variants};
use std::fs;
use std::io::Cursor;

fn scripted(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
    Prompter::new(
        Cursor::new(input.as_bytes().to_vec()),
        Vec::new(),
        KeyInput::Line,
    )
}

fn transcript(prompter: Prompter<Cursor<Vec<u8>>, Vec<u8>>) -> String {
    let (_, output) = prompter.into_parts();
    String::from_utf8(output).expect("utf8 output")
}

#[test]
fn selection_accepts_labels_and_numbers_for_every_index() {
    let choices = ["bundled", "manual", "skip"];
    for number_start in [-2_i64, 0, 1, 7] {
        for (index, label) in choices.iter().enumerate() {
            let mut prompter = scripted(&format!("{label}\n"));
            let picked = prompter
                .request_selection("pick", number_start, &choices)
                .expect("label selects");
            assert_eq!(picked, index);

            let numeral = number_start + index as i64;
            let mut prompter = scripted(&format!("{numeral}\n"));
            let picked = prompter
                .request_selection("pick", number_start, &choices)
                .expect("numeral selects");
            assert_eq!(picked, index);
        }
    }
}

#[test]
fn selection_reprompts_on_out_of_range_numbers() {
    let choices = ["a", "b"];
    let mut prompter = scripted("0\n3\n-1\n99999999999999999999\nnope\n2\n");
    let picked = prompter
        .request_selection("pick one", 1, &choices)
        .expect("eventually selects");
    assert_eq!(picked, 1);

    let text = transcript(prompter);
    assert!(text.starts_with("pick one\n  1. a\n  2. b\n"));
    assert_eq!(text.matches("Invalid number").count(), 3);
    assert_eq!(text.matches("Not a number or choice").count(), 2);
}

#[test]
fn selection_prefers_exact_label_over_numeral() {
    let choices = ["2", "1"];
    let mut prompter = scripted("1\n");
    let picked = prompter
        .request_selection("pick", 1, &choices)
        .expect("selects");
    assert_eq!(picked, 1);
}

#[test]
fn selection_out_of_range_then_eof_aborts() {
    let choices = ["only"];
    let mut prompter = scripted("5\n");
    let err = prompter
        .request_selection("pick", 1, &choices)
        .expect_err("input ends");
    assert!(matches!(err, PromptError::Aborted));
}

#[test]
fn confirmation_accepts_y_and_n_in_any_case() {
    for (input, expected) in [("Y\n", true), ("y\n", true), ("N\n", false), ("n\n", false)] {
        let mut prompter = scripted(input);
        let answer = prompter
            .request_confirmation("continue?", None)
            .expect("answer");
        assert_eq!(answer, expected, "input {input:?}");
    }
}

#[test]
fn confirmation_uses_default_for_empty_input() {
    let mut prompter = scripted("\n");
    assert!(prompter.request_confirmation("go?", Some(true)).unwrap());
    let mut prompter = scripted("   \n");
    assert!(!prompter.request_confirmation("go?", Some(false)).unwrap());
}

#[test]
fn confirmation_without_default_reprompts_on_empty_input() {
    let mut prompter = scripted("\nyes\nmaybe\nn\n");
    let answer = prompter.request_confirmation("go?", None).expect("answer");
    assert!(!answer);

    let text = transcript(prompter);
    assert_eq!(text.matches("go? (y/n) ").count(), 4);
    assert_eq!(text.matches("Input Y or N").count(), 3);
}

#[test]
fn confirmation_hint_reflects_default() {
    let mut prompter = scripted("\n");
    prompter.request_confirmation("a", Some(true)).unwrap();
    assert!(transcript(prompter).starts_with("a (Y/n) "));

    let mut prompter = scripted("\n");
    prompter.request_confirmation("b", Some(false)).unwrap();
    assert!(transcript(prompter).starts_with("b (y/N) "));
}

#[test]
fn every_prompt_aborts_on_closed_input() {
    let mut prompter = scripted("");
    assert!(matches!(prompter.request_line("> "), Err(PromptError::Aborted)));
    assert!(matches!(
        prompter.request_confirmation("?", Some(true)),
        Err(PromptError::Aborted)
    ));
    assert!(matches!(prompter.request_f32("fps: "), Err(PromptError::Aborted)));
    assert!(matches!(
        prompter.request_keypress("press a key"),
        Err(PromptError::Aborted)
    ));
    assert!(matches!(
        prompter.request_validated_line("> ", "bad", |_| true),
        Err(PromptError::Aborted)
    ));
}

#[test]
fn empty_line_is_a_value_not_an_abort() {
    let mut prompter = scripted("\n");
    assert_eq!(prompter.request_line("> ").expect("line"), "");
}

#[test]
fn validated_line_loops_until_predicate_holds() {
    let mut prompter = scripted("short\nlong enough\n");
    let value = prompter
        .request_validated_line("name: ", "too short", |input| input.len() > 5)
        .expect("value");
    assert_eq!(value, "long enough");
    assert_eq!(transcript(prompter).matches("too short").count(), 1);
}

#[test]
fn float_request_trims_whitespace() {
    let mut prompter = scripted("thirty\n 29.97 \n");
    let fps = prompter.request_f32("fps: ").expect("fps");
    assert!((fps - 29.97).abs() < f32::EPSILON);
}

#[test]
fn file_path_request_strips_drag_and_drop_quotes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("broken clip.mp4");
    fs::write(&file, b"data").expect("write file");

    let missing = temp.path().join("missing.mp4");
    let script = format!(
        "{}\n\"{}\"\n",
        missing.display(),
        file.display()
    );
    let mut prompter = scripted(&script);
    let path = prompter.request_file_path("video: ").expect("path");
    assert_eq!(path, file);
    assert_eq!(transcript(prompter).matches("File does not exist").count(), 1);
}

#[test]
fn directory_request_rejects_files() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("file.txt");
    fs::write(&file, b"x").expect("write file");

    let script = format!("{}\n{}\n", file.display(), temp.path().display());
    let mut prompter = scripted(&script);
    let dir = prompter.request_directory_path("dir: ").expect("dir");
    assert_eq!(dir, temp.path());
}

#[test]
fn keypress_in_line_mode_consumes_one_line() {
    let mut prompter = scripted("x\nnext\n");
    assert_eq!(prompter.request_keypress("press").unwrap(), Key::Char('x'));
    assert_eq!(prompter.request_line("").unwrap(), "next");

    let mut prompter = scripted("\n");
    assert_eq!(prompter.request_keypress("press").unwrap(), Key::Enter);
    assert!(transcript(prompter).starts_with("press\n"));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Fast,
    Careful,
}

impl Variants for Mode {
    const ALL: &'static [Self] = &[Mode::Fast, Mode::Careful];
}

#[test]
fn select_variant_maps_labels_through_function() {
    let label = |mode: &Mode| match mode {
        Mode::Fast => "fast".to_string(),
        Mode::Careful => "careful".to_string(),
    };

    let mut prompter = scripted("careful\n");
    assert_eq!(prompter.select_variant("mode", 1, label).unwrap(), Mode::Careful);

    let mut prompter = scripted("0\n");
    assert_eq!(prompter.select_variant("mode", 0, label).unwrap(), Mode::Fast);
}

#[test]
fn select_value_returns_the_value_not_the_index() {
    let values = [30.0_f32, 60.0];
    let mut prompter = scripted("2\n");
    let picked = prompter
        .select_value("rate", 1, &values, |value| format!("{value} fps"))
        .unwrap();
    assert_eq!(picked, 60.0);
}

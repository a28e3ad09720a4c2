//! Terminal drivers for the interactive study documents.
//!
//! Each driver reads one command per line and advances the matching
//! session state machine until the user quits or the document ends.

use std::io::{self, Write};

use tokio::io::{AsyncBufRead, Lines};

use medtutor_chat::render::quiz::{option_letter, OptionMark, QuizState};
use medtutor_chat::render::CardSide;
use medtutor_chat::{CaseStudySession, FlashcardSession, InteractiveSession, QuizSession};

/// Run the driver for `session`. Returns when the user leaves it.
pub async fn run_session<R, W>(
    session: &mut InteractiveSession,
    input: &mut Lines<R>,
    out: &mut W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    match session {
        InteractiveSession::Quiz(quiz) => run_quiz(quiz, input, out).await,
        InteractiveSession::Flashcards(cards) => run_flashcards(cards, input, out).await,
        InteractiveSession::CaseStudy(case) => run_case_study(case, input, out).await,
    }
}

async fn prompt<R, W>(input: &mut Lines<R>, out: &mut W, text: &str) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{}", text)?;
    out.flush()?;
    Ok(input
        .next_line()
        .await?
        .map(|line| line.trim().to_lowercase()))
}

fn parse_option(choice: &str) -> Option<usize> {
    let mut chars = choice.chars();
    match (chars.next(), chars.next()) {
        (Some(c @ 'a'..='z'), None) => Some(c as usize - 'a' as usize),
        _ => None,
    }
}

// =============================================================================
// Quiz
// =============================================================================

fn print_question<W: Write>(quiz: &QuizSession, out: &mut W) -> io::Result<()> {
    let question = quiz.current_question();
    writeln!(
        out,
        "\nPergunta {}/{}: {}",
        quiz.current_index() + 1,
        quiz.total(),
        question.prompt
    )?;
    for (i, (label, mark)) in quiz
        .option_labels()
        .into_iter()
        .zip(quiz.option_marks())
        .enumerate()
    {
        let marker = match mark {
            OptionMark::Correct => " ✅",
            OptionMark::Wrong => " ❌",
            OptionMark::Neutral => "",
        };
        writeln!(out, "  {}) {}{}", option_letter(i), label, marker)?;
    }
    Ok(())
}

fn print_explanation<W: Write>(quiz: &QuizSession, out: &mut W) -> io::Result<()> {
    if let Some(explanation) = quiz.explanation() {
        writeln!(out, "💡 {}", explanation)?;
    }
    Ok(())
}

pub async fn run_quiz<R, W>(
    quiz: &mut QuizSession,
    input: &mut Lines<R>,
    out: &mut W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "\n🧠 {} ({} questões)", quiz.title(), quiz.total())?;
    let mut redraw = true;

    loop {
        match quiz.state() {
            QuizState::ShowingQuestion { .. } => {
                if redraw {
                    print_question(quiz, out)?;
                }
                let last = option_letter(quiz.current_question().options.len().saturating_sub(1));
                let text = format!("Resposta (A-{}), [p] anterior, [q] sair: ", last);
                let Some(choice) = prompt(input, out, &text).await? else {
                    return Ok(());
                };
                redraw = false;
                match choice.as_str() {
                    "q" => return Ok(()),
                    "p" => {
                        redraw = matches!(quiz.previous(), Ok(true));
                    }
                    other => match parse_option(other).map(|opt| quiz.select(opt)) {
                        Some(Ok(true)) => {
                            writeln!(out, "✅ Correto!")?;
                            print_explanation(quiz, out)?;
                        }
                        Some(Ok(false)) => {
                            let correct = option_letter(quiz.current_question().correct);
                            writeln!(out, "❌ Incorreto. Resposta correta: {}", correct)?;
                            print_explanation(quiz, out)?;
                        }
                        Some(Err(e)) => writeln!(out, "{}", e)?,
                        None => writeln!(out, "Opção inválida.")?,
                    },
                }
            }
            QuizState::Answered { index, .. } => {
                if redraw {
                    print_question(quiz, out)?;
                    print_explanation(quiz, out)?;
                }
                if index + 1 == quiz.total() {
                    if let Ok(results) = quiz.results() {
                        writeln!(
                            out,
                            "\n📊 Resultado: {}/{} ({}%)\n{}",
                            results.score, results.total, results.percent, results.message
                        )?;
                    }
                    return Ok(());
                }
                let Some(choice) =
                    prompt(input, out, "[Enter] próxima, [p] anterior, [q] sair: ").await?
                else {
                    return Ok(());
                };
                redraw = match choice.as_str() {
                    "q" => return Ok(()),
                    "p" => matches!(quiz.previous(), Ok(true)),
                    _ => matches!(quiz.next(), Ok(true)),
                };
            }
            QuizState::ShowingResults { .. } => return Ok(()),
        }
    }
}

// =============================================================================
// Flashcards
// =============================================================================

fn print_tally<W: Write>(cards: &FlashcardSession, out: &mut W) -> io::Result<()> {
    let tally = cards.tally();
    writeln!(
        out,
        "\n📊 Placar: {} ✅ / {} ❌ ({}%)",
        tally.correct,
        tally.incorrect,
        tally.percent_correct()
    )
}

pub async fn run_flashcards<R, W>(
    cards: &mut FlashcardSession,
    input: &mut Lines<R>,
    out: &mut W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "\n🃏 {} ({} cartões)", cards.title(), cards.total())?;

    loop {
        let side = match cards.side() {
            CardSide::Front => "frente",
            CardSide::Back => "verso",
        };
        writeln!(
            out,
            "\nCartão {}/{} ({}): {}",
            cards.index() + 1,
            cards.total(),
            side,
            cards.visible_text()
        )?;
        let Some(choice) = prompt(
            input,
            out,
            "[Enter] virar, [c] acertei, [e] errei, [n] próximo, [p] anterior, [q] sair: ",
        )
        .await?
        else {
            break;
        };

        match choice.as_str() {
            "" | "v" => {
                cards.flip();
            }
            "c" | "e" => {
                let was_last = cards.is_last();
                if choice == "c" {
                    cards.mark_right();
                } else {
                    cards.mark_wrong();
                }
                if was_last {
                    break;
                }
            }
            "n" => {
                if !cards.next() {
                    writeln!(out, "Este é o último cartão.")?;
                }
            }
            "p" => {
                if !cards.previous() {
                    writeln!(out, "Este é o primeiro cartão.")?;
                }
            }
            "q" => break,
            _ => writeln!(out, "Comando inválido.")?,
        }
    }

    if cards.tally().marked() > 0 {
        print_tally(cards, out)?;
    }
    Ok(())
}

// =============================================================================
// Case study
// =============================================================================

fn print_case<W: Write>(case: &CaseStudySession, out: &mut W) -> io::Result<()> {
    writeln!(out, "\n🏥 {}", case.title())?;
    for (i, section) in case.sections().iter().enumerate() {
        if case.is_visible(i) {
            writeln!(out, "\n## {}\n{}", section.heading, section.body)?;
        } else {
            writeln!(out, "\n🔒 [{}] {}", i + 1, section.heading)?;
        }
    }
    Ok(())
}

pub async fn run_case_study<R, W>(
    case: &mut CaseStudySession,
    input: &mut Lines<R>,
    out: &mut W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    print_case(case, out)?;
    if !case.sections().iter().any(|s| s.reveal_gated) {
        return Ok(());
    }

    loop {
        let Some(choice) = prompt(
            input,
            out,
            "\nNúmero da seção para revelar/ocultar, [q] sair: ",
        )
        .await?
        else {
            return Ok(());
        };
        if choice == "q" {
            return Ok(());
        }
        let toggled = choice
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .map(|i| case.toggle(i));
        match toggled {
            Some(Ok(_)) => print_case(case, out)?,
            Some(Err(e)) => writeln!(out, "{}", e)?,
            None => writeln!(out, "Comando inválido.")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medtutor_chat::types::{
        CaseSection, CaseStudyDocument, Flashcard, FlashcardDocument, QuizDocument, QuizQuestion,
    };
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn script(text: &'static str) -> Lines<BufReader<&'static [u8]>> {
        BufReader::new(text.as_bytes()).lines()
    }

    fn output(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    fn quiz(correct: &[usize]) -> QuizSession {
        QuizSession::new(QuizDocument {
            title: "Cardiologia".to_string(),
            questions: correct
                .iter()
                .enumerate()
                .map(|(i, &c)| QuizQuestion {
                    prompt: format!("Pergunta {}", i + 1),
                    options: vec![
                        "A) Primeira".to_string(),
                        "B) Segunda".to_string(),
                        "C) Terceira".to_string(),
                    ],
                    correct: c,
                    explanation: format!("Explicação {}", i + 1),
                })
                .collect(),
        })
        .unwrap()
    }

    // =========================================================================
    // Quiz
    // =========================================================================

    #[tokio::test]
    async fn test_quiz_to_results() {
        let mut session = quiz(&[0, 1, 2]);
        let mut input = script("a\n\na\n\nc\n");
        let mut out = Vec::new();
        run_quiz(&mut session, &mut input, &mut out).await.unwrap();

        let text = output(out);
        assert!(text.contains("✅ Correto!"));
        assert!(text.contains("❌ Incorreto. Resposta correta: B"));
        assert!(text.contains("💡 Explicação 2"));
        assert!(text.contains("Resultado: 2/3 (67%)"));
        assert!(text.contains("📚 Continue estudando."));
        // Labels are shown without their original prefix.
        assert!(text.contains("  A) Primeira"));
        assert!(!text.contains("A) A) "));
    }

    #[tokio::test]
    async fn test_quiz_invalid_and_early_exit() {
        let mut session = quiz(&[0, 0]);
        let mut input = script("z\n1\nq\n");
        let mut out = Vec::new();
        run_quiz(&mut session, &mut input, &mut out).await.unwrap();

        let text = output(out);
        assert!(text.contains("does not exist"));
        assert!(text.contains("Opção inválida."));
        assert!(!text.contains("Resultado"));
        assert_eq!(session.score(), 0);
    }

    #[tokio::test]
    async fn test_quiz_previous_replays_answer() {
        let mut session = quiz(&[1, 0]);
        let mut input = script("b\n\np\n");
        let mut out = Vec::new();
        run_quiz(&mut session, &mut input, &mut out).await.unwrap();

        // Back on the answered first question, then input ran out.
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.score(), 1);
        assert!(output(out).contains("  B) Segunda ✅"));
    }

    // =========================================================================
    // Flashcards
    // =========================================================================

    fn deck() -> FlashcardSession {
        FlashcardSession::new(FlashcardDocument {
            title: "Farmacologia".to_string(),
            cards: vec![
                Flashcard {
                    front: "Antídoto do paracetamol".to_string(),
                    back: "N-acetilcisteína".to_string(),
                },
                Flashcard {
                    front: "Antídoto da heparina".to_string(),
                    back: "Protamina".to_string(),
                },
            ],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_flashcards_flip_and_mark() {
        let mut session = deck();
        let mut input = script("\nc\n\ne\n");
        let mut out = Vec::new();
        run_flashcards(&mut session, &mut input, &mut out).await.unwrap();

        let text = output(out);
        assert!(text.contains("Cartão 1/2 (frente): Antídoto do paracetamol"));
        assert!(text.contains("Cartão 1/2 (verso): N-acetilcisteína"));
        assert!(text.contains("Cartão 2/2 (verso): Protamina"));
        assert!(text.contains("Placar: 1 ✅ / 1 ❌ (50%)"));
    }

    #[tokio::test]
    async fn test_flashcards_navigation_bounds() {
        let mut session = deck();
        let mut input = script("p\nn\nn\nq\n");
        let mut out = Vec::new();
        run_flashcards(&mut session, &mut input, &mut out).await.unwrap();

        let text = output(out);
        assert!(text.contains("Este é o primeiro cartão."));
        assert!(text.contains("Este é o último cartão."));
        assert!(!text.contains("Placar"));
        assert_eq!(session.index(), 1);
    }

    // =========================================================================
    // Case study
    // =========================================================================

    fn case(gated: bool) -> CaseStudySession {
        CaseStudySession::new(CaseStudyDocument {
            title: "Dor torácica".to_string(),
            sections: vec![
                CaseSection {
                    heading: "Apresentação".to_string(),
                    body: "Homem, 58 anos, dor retroesternal.".to_string(),
                    reveal_gated: false,
                },
                CaseSection {
                    heading: "Diagnóstico".to_string(),
                    body: "IAM com supra de ST.".to_string(),
                    reveal_gated: gated,
                },
            ],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_case_study_reveal() {
        let mut session = case(true);
        let mut input = script("2\n9\nq\n");
        let mut out = Vec::new();
        run_case_study(&mut session, &mut input, &mut out).await.unwrap();

        let text = output(out);
        assert!(text.contains("🔒 [2] Diagnóstico"));
        assert!(text.contains("## Diagnóstico\nIAM com supra de ST."));
        assert!(text.contains("does not exist"));
        assert!(session.is_visible(1));
    }

    #[tokio::test]
    async fn test_case_study_without_gates_returns_immediately() {
        let mut session = case(false);
        let mut input = script("2\n");
        let mut out = Vec::new();
        run_case_study(&mut session, &mut input, &mut out).await.unwrap();

        let text = output(out);
        assert!(text.contains("## Diagnóstico"));
        assert!(!text.contains("revelar"));
        // Input was left untouched.
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_run_session_dispatches_by_kind() {
        let mut session = InteractiveSession::CaseStudy(case(false));
        let mut input = script("");
        let mut out = Vec::new();
        run_session(&mut session, &mut input, &mut out).await.unwrap();
        assert!(output(out).contains("🏥 Dor torácica"));
    }
}

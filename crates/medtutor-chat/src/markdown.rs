//! Markdown normaliser for compressed model output.

use regex::Regex;
use std::sync::LazyLock;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let rule = |pattern: &str, replacement: &'static str| Rule {
        pattern: Regex::new(pattern).expect("Invalid markdown regex"),
        replacement,
    };
    vec![
        // ***Term:*** -> paragraph, **Term:**
        rule(r"\*\*\*([^*]+):\s*\*\*\*\s*", "\n\n**$1:** "),
        // Bold opening glued to the end of a sentence.
        rule(r"([.?!;])\s*(\*\*)([^\s*])", "$1\n\n$2$3"),
        // Bullet glued to the bold text before it.
        rule(r"(\*\*[^*\n]+\*\*)[ \t]*\*[ \t]*([^*\s])", "$1\n* $2"),
        // Bullet marker glued to its first word.
        rule(r"(?m)^-([\p{L}\p{N}])", "- $1"),
        rule(r"(?m)^\*(\p{Lu})", "* $1"),
        // List starting on the same line as the sentence before it.
        rule(r"([.?!;])[ \t]*(\*[^*\n]|- )", "$1\n\n$2"),
        rule(r"\n{3,}", "\n\n"),
    ]
});

/// Clean up the model's markdown before it is rendered as prose.
pub fn normalize_markdown(text: &str) -> String {
    let mut out = text.to_string();
    for rule in RULES.iter() {
        out = rule
            .pattern
            .replace_all(&out, rule.replacement)
            .into_owned();
    }
    out.trim_start_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triple_asterisk_term() {
        assert_eq!(
            normalize_markdown("***Definição:***A sepse é grave."),
            "**Definição:** A sepse é grave."
        );
        assert_eq!(
            normalize_markdown("Intro. ***Causas:*** várias"),
            "Intro.\n\n**Causas:** várias"
        );
    }

    #[test]
    fn test_sentence_then_bold_gets_paragraph() {
        assert_eq!(
            normalize_markdown("Fim da frase.**Próximo tópico** aqui"),
            "Fim da frase.\n\n**Próximo tópico** aqui"
        );
    }

    #[test]
    fn test_closing_bold_after_punctuation_untouched() {
        let text = "**Atenção.** Monitorar lactato.";
        assert_eq!(normalize_markdown(text), text);
    }

    #[test]
    fn test_bullet_spacing() {
        assert_eq!(normalize_markdown("-Febre\n-Taquicardia"), "- Febre\n- Taquicardia");
        assert_eq!(normalize_markdown("*Hipotensão"), "* Hipotensão");
        assert_eq!(normalize_markdown("**negrito** no início"), "**negrito** no início");
        assert_eq!(normalize_markdown("---"), "---");
    }

    #[test]
    fn test_bullet_after_bold_moves_to_new_line() {
        assert_eq!(
            normalize_markdown("**Sintomas:*** Febre alta"),
            "**Sintomas:**\n* Febre alta"
        );
        assert_eq!(
            normalize_markdown("**Sinais:** *Taquicardia"),
            "**Sinais:**\n* Taquicardia"
        );
        assert_eq!(normalize_markdown("**A** e **B**"), "**A** e **B**");
    }

    #[test]
    fn test_list_after_sentence_gets_paragraph() {
        assert_eq!(
            normalize_markdown("Sinais de alerta. - Hipotensão"),
            "Sinais de alerta.\n\n- Hipotensão"
        );
        assert_eq!(
            normalize_markdown("Quadro clássico.* Febre alta"),
            "Quadro clássico.\n\n* Febre alta"
        );
        let list = "- Febre.\n- Tosse.";
        assert_eq!(normalize_markdown(list), list);
    }

    #[test]
    fn test_collapse_newlines() {
        assert_eq!(normalize_markdown("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_clean_text_is_unchanged() {
        let text = "### Sepse\n\n- **Definição**: disfunção orgânica.\n- Tratamento precoce.";
        assert_eq!(normalize_markdown(text), text);
    }
}

//! Prompt configuration registry.
//!
//! One immutable [`PromptConfig`] per [`Category`], built once on first use
//! and shared for the lifetime of the process.

use std::sync::LazyLock;

use crate::classifier::rules_for;
use crate::types::{Category, OutputShape};

/// Model parameters and instructions for one category.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptConfig {
    pub category: Category,
    /// Classifier rule sources, in evaluation order. Empty for the default.
    pub match_rules: &'static [&'static str],
    pub system_instruction: &'static str,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f32,
    /// Output token budget, always greater than zero.
    pub max_tokens: u32,
    pub output_shape: OutputShape,
    /// Short progress text shown while waiting for the model.
    pub status_label: &'static str,
}

impl PromptConfig {
    /// Progress text for a send carrying `image_count` attachments.
    ///
    /// Image sends get an image-specific notice regardless of category.
    pub fn processing_status(&self, image_count: usize) -> Option<String> {
        match image_count {
            0 if self.status_label.is_empty() => None,
            0 => Some(self.status_label.to_string()),
            1 => Some("🔬 Analisando imagem médica...".to_string()),
            n => Some(format!("🔬 Processando {} imagens médicas...", n)),
        }
    }
}

// =============================================================================
// System instructions
// =============================================================================

const CURRICULUM_INSTRUCTION: &str = r#"[ROLE] Você é o "Master Educator", um Assistente de Ensino Médico de Elite.
[CONTEXT] Seu usuário é um Professor Universitário de Medicina ou Preceptor Clínico. Eles exigem rigor científico absoluto, medicina baseada em evidências (EBM) e alinhamento com as melhores metodologias ativas de ensino (PBL, TBL, Peer Instruction).
[TASK] Atue como um co-piloto pedagógico. Desenvolva materiais didáticos avançados de forma imediata e robusta:
1. Para Planos de Aula/Ementas: Sempre estruture os Objetivos de Aprendizagem aplicando a *TAXONOMIA DE BLOOM* (ex: Identificar, Compreender, Aplicar, Avaliar). Inclua divisão de tempo (Timebox) estruturada.
2. Para Avaliações Práticas (OSCE/Mini-CEX): Gere de forma OBRIGATÓRIA as instruções para o ator/simulador, as diretrizes para o aluno, e um *Checklist do Avaliador* em formato de Tabela com pontuações.
3. Para Metodologias Ativas (PBL/TBL): Crie "Problemas" (Gatilhos) complexos, divididos em aberturas e fechamentos progressivos.
4. Para Clínica e Resumos: Ancore-se nas diretrizes (SUS, AMB, AHA, etc) e sugira bibliografias-chave.
[FORMAT] Responda ESTRITAMENTE em Português (Brasil). O material deve ser altamente formatado usando Markdown avançado. Use Títulos (###), Tabelas (indispensável para cronogramas ou rubricas), e Bullets. NUNCA gere blocos de texto gigantes e difíceis de ler. Seja direto e acadêmico."#;

const ASSESSMENT_INSTRUCTION: &str = r#"[ROLE] Você é o Diretor da Banca Elaboradora de Exames Médicos.
[CONTEXT] Professores utilizam este módulo para gerar provas e exercícios de Altíssimo Rigor Acadêmico (Padrão ENAMED, ENADE, Revalida e Residência Médica).
[TASK] Você deve gerar listas rigorosas de questões de Múltipla Escolha (A, B, C, D, E).
REGRAS OBRIGATÓRIAS:
1. OBRIGATÓRIO: Toda questão deve iniciar com um "Caso Clínico" (Clinical Vignette) rico em detalhes pertinentes (HMA, Exame Físico, Laboratório). Nada de perguntas curtas e diretas.
2. OBRIGATÓRIO: Forneça opções de A a E plausíveis (distratores de alta qualidade).
3. OBRIGATÓRIO: Ao final de toda a prova, crie uma seção "GABARITO COMENTADO". Para *cada questão*, diga qual é a certa e EXPLIQUE DETALHADAMENTE COMO A FISIOPATOLOGIA DESCARTA AS OPÇÕES ERRADAS.
[FORMAT] Responda APENAS em Português do Brasil usando Markdown Puro (### Para o Título da Prova, **Negrito** para as perguntas/alternativas, e blockquotes > para o Gabarito). NÃO USE JSON AQUI. Estruture como um documento de prova real pronto para impressão."#;

const QUIZ_INSTRUCTION: &str = r#"[ROLE] Você é um preparador de exames médicos especialista em USMLE e Revalida.
[CONTEXT] O aluno precisa testar seus conhecimentos através de vinhetas clínicas de alto nível.
[TASK] Crie questões de múltipla escolha baseadas em Casos Clínicos (Clinical Vignettes).
[FORMAT] Responda APENAS com JSON válido neste formato exato (sem Markdown em volta do JSON):
{"type":"quiz","title":"Título do Quiz","questions":[{"question":"Vinheta clínica detalhada e Pergunta?","options":["A) ...","B) ...","C) ...","D) ..."],"correct":0,"explanation":"Explicação FOCO: Descreva detalhadamente por que a correta é a correta, e EXPLIQUE CLARAMENTE POR QUE CADA UMA DAS OUTRAS ALTERNATIVAS ESTÁ INCORRETA."}]}
correct = índice base-0. Responda em português do Brasil."#;

const FLASHCARD_INSTRUCTION: &str = r#"[ROLE] Você é um tutor de retenção de conhecimento médico utilizando Active Recall.
[TASK] Gere flashcards com foco em aplicação clínica, não apenas decoreba.
[FORMAT] Responda APENAS com JSON válido neste formato:
{"type":"flashcards","title":"Título","cards":[{"front":"Pergunta/Conceito (Frente)","back":"Explicação/Resposta detalhada (Verso)"}]}
Responda em português do Brasil."#;

const CASE_STUDY_INSTRUCTION: &str = r#"[ROLE] Você é um Preceptor Clínico Especialista em PBL (Problem-Based Learning).
[CONTEXT] O usuário é um aluno de medicina em treinamento clínico.
[TASK] Simule um caso clínico realista, encorajando o raciocínio estruturado. Faça o aluno solicitar os próximos exames ou passos lógicos.
[FORMAT] Responda APENAS com JSON válido neste formato (sem bordas markdown):
{"type":"case_study","title":"Título do Caso","sections":[{"heading":"Apresentação do Paciente / HMA / Exame Físico Inicial","content":"Conteúdo clínico detalhado. Finalize sempre perguntando: 'Qual é o seu diagnóstico diferencial preliminar e quais exames você solicitaria agora?'","spoiler":false}]}
Use spoiler:true apenas para a resolução final do caso (Diagnóstico Definitivo e Tratamento Padrão-Ouro). Responda em português do Brasil."#;

const IMAGE_INSTRUCTION: &str = r#"[ROLE] You are an expert medical radiologist and diagnostic imager.
[TASK] Analyze the provided medical image(s) step by step and provide a structured, professional radiologist report. Identify key anatomical landmarks and highlight abnormalities.
[FORMAT] Use clear sections indicating Findings, Impression, and Recommendations. Respond in Portuguese (Brazil)."#;

const TUTOR_INSTRUCTION: &str = r#"[ROLE] Você é o Preceptor MedGemma, um Tutor Médico Avançado.
[CONTEXT] Você interage com alunos de medicina e profissionais de saúde, focando no ensino por Metodologia Ativa (Active Recall e Raciocínio Clínico EBM).
[TASK] Suas respostas devem GUIAR o aluno para a resposta correta através de perguntas socráticas, raciocínio passo-a-passo e dicas, AO INVÉS de apenas dar a resposta pronta ou diagnóstico inicial cravado imediatamente. Sempre instigue o aluno a formular seu próprio diagnóstico diferencial primeiro.
[FORMAT] CRITICAL FORMATTING INSTRUCTIONS FOR EXPERT READABILITY:
1. NEVER output a wall of text.
2. USE MARKDOWN HEADINGS (###) to organize thoughts.
3. USE BULLET POINTS (- or *) profusely to list items or differentials. Add a blank line before and after lists.
4. HIGHLIGHT key medical terms, conditions, and concepts in **bold**.
5. Emphasize important warnings or concepts in *italics* or blockquotes (>).
Do not output raw compressed text. Always format beautifully and respond in Portuguese (Brazil)."#;

// =============================================================================
// Registry
// =============================================================================

fn build(category: Category) -> PromptConfig {
    let (system_instruction, temperature, max_tokens, output_shape, status_label) = match category
    {
        Category::CurriculumTooling => (
            CURRICULUM_INSTRUCTION,
            0.3,
            4096,
            OutputShape::FreeText,
            "📚 Preparando material didático...",
        ),
        Category::AssessmentGenerator => (
            ASSESSMENT_INSTRUCTION,
            0.4,
            8192,
            OutputShape::FreeText,
            "📝 Elaborando prova...",
        ),
        Category::ExamGenerator => (
            QUIZ_INSTRUCTION,
            0.5,
            4096,
            OutputShape::QuizDocument,
            "🧠 Gerando quiz...",
        ),
        Category::StudyCardGenerator => (
            FLASHCARD_INSTRUCTION,
            0.5,
            4096,
            OutputShape::FlashcardDocument,
            "🃏 Criando flashcards...",
        ),
        Category::ScenarioSimulator => (
            CASE_STUDY_INSTRUCTION,
            0.6,
            4096,
            OutputShape::CaseStudyDocument,
            "📋 Elaborando caso clínico...",
        ),
        Category::ImageAnalysis => (
            IMAGE_INSTRUCTION,
            0.2,
            4096,
            OutputShape::FreeText,
            "🩻 Analisando radiologia...",
        ),
        Category::GeneralTutor => (TUTOR_INSTRUCTION, 0.3, 4096, OutputShape::FreeText, ""),
    };

    PromptConfig {
        category,
        match_rules: rules_for(category),
        system_instruction,
        temperature,
        max_tokens,
        output_shape,
        status_label,
    }
}

/// Indexed in [`Category::ALL`] order.
static REGISTRY: LazyLock<Vec<PromptConfig>> =
    LazyLock::new(|| Category::ALL.iter().copied().map(build).collect());

/// Configuration for `category`. Total over every category.
pub fn resolve(category: Category) -> &'static PromptConfig {
    let index = Category::ALL
        .iter()
        .position(|c| *c == category)
        .unwrap_or(Category::ALL.len() - 1);
    &REGISTRY[index]
}

/// Every configuration, in classification priority order.
pub fn all() -> impl Iterator<Item = &'static PromptConfig> {
    REGISTRY.iter()
}

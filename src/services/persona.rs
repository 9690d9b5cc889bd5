//! Persona selection — ordered keyword rules, first match wins.
//!
//! Matching is a case-insensitive substring test on the message. Ties are
//! broken by rule order, not by where a keyword appears in the message.

/// System instruction family sent with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    General,
    Creative,
    Technical,
    Analytical,
    CvAnalysis,
}

const CHAT_RULES: &[(Persona, &[&str])] = &[
    (
        Persona::Creative,
        &["creative writing", "content", "story", "essay", "blog", "marketing", "property description"],
    ),
    (Persona::Technical, &["code", "programming", "development", "debug", "api", "database", "script"]),
    (
        Persona::Analytical,
        &["problem", "solving", "solution", "analysis", "strategy", "decision", "step by step"],
    ),
];

const ANALYSIS_RULES: &[(Persona, &[&str])] = &[(
    Persona::CvAnalysis,
    &["cv", "resume", "candidate", "skills", "experience", "qualifications", "hire", "recruit"],
)];

fn first_match(rules: &[(Persona, &[&str])], text: &str) -> Persona {
    let lowered = text.to_lowercase();
    rules
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map_or(Persona::General, |(persona, _)| *persona)
}

/// Persona for a context-free chat message.
#[must_use]
pub fn for_chat(message: &str) -> Persona {
    first_match(CHAT_RULES, message)
}

/// Persona for a document-analysis prompt: CV analysis or general.
#[must_use]
pub fn for_analysis(prompt: &str) -> Persona {
    first_match(ANALYSIS_RULES, prompt)
}

impl Persona {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Creative => "creative",
            Self::Technical => "technical",
            Self::Analytical => "analytical",
            Self::CvAnalysis => "cv_analysis",
        }
    }

    #[must_use]
    pub fn system_instruction(self) -> &'static str {
        match self {
            Self::General => {
                "You are a professional AI assistant. Answer clearly and accurately, \
                 and when documents are provided, ground your answers in their content."
            }
            Self::Creative => {
                "You are a creative writing specialist. Help create compelling descriptions, \
                 marketing copy, blog posts and other creative content. Favour elegant, \
                 persuasive language suited to the audience."
            }
            Self::Technical => {
                "You are a senior software developer and code reviewer. Help with code analysis, \
                 debugging, API development, database design and web development, and give \
                 practical, working solutions."
            }
            Self::Analytical => {
                "You are a strategic consultant and problem-solving expert. Break complex problems \
                 down, give step-by-step analysis, offer several solution approaches and support \
                 the decision-making process."
            }
            Self::CvAnalysis => {
                "You are an experienced recruitment analyst. Evaluate CVs and resumes objectively: \
                 summarise each candidate's skills, experience and qualifications, compare candidates \
                 when asked, and keep personal details confidential unless explicitly requested."
            }
        }
    }
}

#[cfg(test)]
#[path = "persona_test.rs"]
mod tests;

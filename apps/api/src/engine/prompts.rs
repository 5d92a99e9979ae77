// All LLM prompt constants for the optimization engine.
// Reuses cross-cutting fragments from llm_client::prompts; templates are filled
// with llm_client::prompts::fill_template.

/// System prompt for element extraction. Enforces JSON-only output.
pub const EXTRACTION_SYSTEM: &str = "You are an expert recruiter and résumé analyst. \
    Extract every meaningful requirement or qualification fact from a document. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Element extraction prompt. Replace `{role}` and `{text}` before sending.
pub const EXTRACTION_PROMPT_TEMPLATE: &str = r#"Extract structured elements from the document below.

Return a JSON object with this EXACT schema (no extra fields):
{
  "sections": [
    {
      "name": "requirements",
      "elements": [
        {
          "text": "5+ years of Rust",
          "tags": ["technical-skill", "experience"],
          "context": "5+ years of Rust in production systems required",
          "start": 120,
          "end": 136,
          "confidence": 0.9
        }
      ]
    }
  ]
}

Rules:
- "name" is the heading the element appeared under (requirements, qualifications,
  responsibilities, nice to have, skills, experience, education, certifications, summary).
- "text" is the shortest surface form that names the fact, copied from the document.
- "tags" come ONLY from: technical-skill, tool, soft-skill, attribute, experience,
  education, certification, seniority, domain, concept.
- "start"/"end" are character offsets of "text" in the document.
- "confidence" in [0, 1] is how sure you are that the element is real and correctly tagged.
- List a fact again if the document repeats it under another heading.

DOCUMENT ROLE: {role}

DOCUMENT:
{text}"#;

/// System prompt for batched semantic matching.
pub const MATCH_SYSTEM: &str = "You are a precise semantic matcher comparing job \
    requirements to résumé facts. Judge meaning, not spelling. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Batched matching prompt. Replace `{job_json}` and `{resume_json}` before sending.
pub const MATCH_PROMPT_TEMPLATE: &str = r#"For each job element, list the résumé elements that satisfy it.

JOB ELEMENTS:
{job_json}

RESUME ELEMENTS:
{resume_json}

Return a JSON object with this EXACT schema:
{
  "matches": [
    {"job_id": 0, "resume_id": 3, "strength": 0.85, "relationship": "synonym"}
  ]
}

Rules:
- "job_id" and "resume_id" are the ids given above. Use "resume_id": null when nothing fits.
- "strength" in [0, 1]: 1.0 identical meaning, 0.7 clearly equivalent, 0.4 loosely related.
- "relationship" is one of: exact, synonym, related, unrelated.
- You may list several candidates for the same job element."#;

/// System prompt for the recommendation summary.
pub const SUMMARY_SYSTEM: &str = "You are a concise career coach. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object.";

/// Summary prompt. Replace `{score}`, `{target}`, `{priority_json}`, `{rewording_json}`.
pub const SUMMARY_PROMPT_TEMPLATE: &str = r#"{grounding_instruction}

Current fit score: {score}. Target: {target}.

Must-fix items (most important first):
{priority_json}

Rewording opportunities:
{rewording_json}

Write at most three sentences telling the candidate what to do next, covering the top
two or three must-fix items first. Mention only items listed above.

Return: {"summary": "..."}"#;

/// System prompt for the revision step.
pub const REVISION_SYSTEM: &str = "You are an expert résumé editor. \
    You revise résumés to better reflect existing experience for a target role. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object.";

/// Revision prompt. Replace `{grounding_instruction}`, `{job_text}`,
/// `{recommendations_json}`, `{resume_text}`.
pub const REVISION_PROMPT_TEMPLATE: &str = r#"{grounding_instruction}

TARGET JOB POSTING:
{job_text}

RECOMMENDATIONS (apply where the existing résumé supports them):
{recommendations_json}

CURRENT RÉSUMÉ:
{resume_text}

Return the full revised résumé as plain text with section headings preserved:
{"revised_resume": "..."}"#;

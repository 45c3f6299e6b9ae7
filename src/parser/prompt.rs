/// Build the single extraction prompt sent to the language model.
pub fn build_prompt(transcription: &str, creator_name: &str) -> String {
    format!(
        r#"You are an expert at analyzing sound design tutorials for Ableton Live.

Analyze the following transcription from a TikTok video by {creator_name} and extract structured sound design instructions.

TRANSCRIPTION:
{transcription}

Respond with ONLY valid JSON (no markdown, no explanation) in this exact format:
{{
  "title": "Short descriptive title for this sound (e.g., 'Massive Reese Bass', 'Plucky Arp')",
  "sound_type": "Category of sound (e.g., 'bass', 'lead', 'pad', 'arp', 'kick', 'snare', 'fx', 'chord')",
  "creator_name": "The creator's display name",
  "is_sound_design": true or false (false if this isn't actually a sound design tutorial),
  "instructions": [
    {{
      "step_number": 1,
      "description": "Clear instruction of what to do",
      "ableton_device": "Name of Ableton device if mentioned (e.g., 'Wavetable', 'Operator', 'Serum', 'Saturator')",
      "parameters": {{"param_name": "value"}},
      "notes": "Any additional tips or context"
    }}
  ]
}}

Rules:
- If this isn't a sound design tutorial, set is_sound_design to false and return empty instructions
- Extract specific parameter values when mentioned (frequencies, percentages, knob positions)
- Identify the Ableton device or VST being used for each step
- Keep descriptions clear and actionable
- Include any tips or warnings mentioned by the creator"#
    )
}

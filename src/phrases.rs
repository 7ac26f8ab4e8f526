//! What gets said for each event.

use std::collections::HashSet;

use tracing::warn;

use crate::config::PhrasesConfig;
use crate::scans::PersonId;
use crate::speaker::VoiceMode;

pub struct Phrasebook {
    config: PhrasesConfig,
}

impl Phrasebook {
    pub fn new(config: PhrasesConfig) -> Self {
        if config.honorifics.is_empty() {
            warn!("No honorific rules configured, person ids will be spoken as-is (see config.example.yaml)");
        }
        Self { config }
    }

    /// Spoken form of a person's name. The first rule whose pattern occurs in
    /// the id wins; without a match the id itself is spoken.
    pub fn honorific(&self, person: &str) -> String {
        self.config
            .honorifics
            .iter()
            .find(|rule| !rule.pattern.is_empty() && person.contains(&rule.pattern))
            .map(|rule| rule.spoken.clone())
            .unwrap_or_else(|| person.to_string())
    }

    pub fn greeting(&self, hour: u32) -> &str {
        if hour < self.config.morning_until_hour {
            &self.config.morning
        } else if hour < self.config.afternoon_until_hour {
            &self.config.afternoon
        } else {
            &self.config.evening
        }
    }

    pub fn farewell(&self) -> &str {
        &self.config.farewell
    }

    pub fn mode_for(&self, person: &str) -> VoiceMode {
        if self.config.regional_persons.iter().any(|p| p == person) {
            VoiceMode::Regional
        } else {
            VoiceMode::Standard
        }
    }

    pub fn arrival(&self, person: &str, hour: u32) -> Vec<String> {
        vec![self.honorific(person), self.greeting(hour).to_string()]
    }

    pub fn departure(&self, person: &str) -> Vec<String> {
        vec![self.honorific(person), self.farewell().to_string()]
    }

    /// Every phrase an arrival or departure of `persons` can need, grouped by
    /// the voice it is spoken in. Voices without persons are left out.
    pub fn essentials(&self, persons: &[PersonId]) -> Vec<(VoiceMode, Vec<String>)> {
        let mut groups = Vec::new();
        for mode in [VoiceMode::Standard, VoiceMode::Regional] {
            let names: Vec<String> = persons
                .iter()
                .filter(|p| self.mode_for(p) == mode)
                .map(|p| self.honorific(p))
                .collect();
            if names.is_empty() {
                continue;
            }

            let fixed = [
                &self.config.morning,
                &self.config.afternoon,
                &self.config.evening,
                &self.config.farewell,
            ];
            let mut seen = HashSet::new();
            let phrases: Vec<String> = names
                .into_iter()
                .chain(fixed.into_iter().cloned())
                .filter(|phrase| seen.insert(phrase.clone()))
                .collect();
            groups.push((mode, phrases));
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HonorificRule;

    fn book() -> Phrasebook {
        let rule = |pattern: &str, spoken: &str| HonorificRule {
            pattern: pattern.into(),
            spoken: spoken.into(),
        };
        Phrasebook::new(PhrasesConfig {
            honorifics: vec![
                rule("Hara", "ハラさん"),
                rule("Kuwano", "クワノ先生"),
                rule("", "nobody"),
                rule("Kuwano", "shadowed"),
            ],
            regional_persons: vec!["Reiko Kuwano".into()],
            ..PhrasesConfig::default()
        })
    }

    #[test]
    fn first_matching_rule_wins() {
        let book = book();
        assert_eq!(book.honorific("Reiko Kuwano"), "クワノ先生");
        assert_eq!(book.honorific("Yutaro Hara"), "ハラさん");
        assert_eq!(book.honorific("Li Yang"), "Li Yang");
    }

    #[test]
    fn greeting_follows_the_clock() {
        let book = book();
        assert_eq!(book.greeting(0), "おはようございます");
        assert_eq!(book.greeting(10), "おはようございます");
        assert_eq!(book.greeting(11), "こんにちは");
        assert_eq!(book.greeting(16), "こんにちは");
        assert_eq!(book.greeting(17), "こんばんは");
        assert_eq!(book.greeting(23), "こんばんは");
    }

    #[test]
    fn sentences_lead_with_the_name() {
        let book = book();
        assert_eq!(book.arrival("Yutaro Hara", 9), vec!["ハラさん", "おはようございます"]);
        assert_eq!(book.departure("Yutaro Hara"), vec!["ハラさん", "お疲れ様でした"]);
    }

    #[test]
    fn regional_voice_is_per_person() {
        let book = book();
        assert_eq!(book.mode_for("Reiko Kuwano"), VoiceMode::Regional);
        assert_eq!(book.mode_for("Yutaro Hara"), VoiceMode::Standard);
    }

    #[test]
    fn essentials_are_grouped_by_voice() {
        let book = book();
        let persons: Vec<PersonId> = vec!["Yutaro Hara".into(), "Li Yang".into(), "Reiko Kuwano".into()];
        let groups = book.essentials(&persons);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, VoiceMode::Standard);
        assert_eq!(&groups[0].1[..2], &["ハラさん", "Li Yang"]);
        assert!(groups[0].1.iter().any(|p| p == "お疲れ様でした"));
        assert_eq!(groups[1].0, VoiceMode::Regional);
        assert_eq!(groups[1].1[0], "クワノ先生");
        assert_eq!(groups[1].1.len(), 5);

        assert!(book.essentials(&[]).is_empty());
    }

    #[test]
    fn essentials_have_no_repeats() {
        let book = Phrasebook::new(PhrasesConfig {
            honorifics: vec![
                HonorificRule {
                    pattern: "Hara".into(),
                    spoken: "ハラさん".into(),
                },
                HonorificRule {
                    pattern: "Greeter".into(),
                    spoken: "こんにちは".into(),
                },
            ],
            ..PhrasesConfig::default()
        });
        let persons: Vec<PersonId> = vec![
            "Yutaro Hara".into(),
            "Li Yang".into(),
            "Mika Hara".into(),
            "The Greeter".into(),
        ];
        let groups = book.essentials(&persons);

        assert_eq!(groups.len(), 1);
        let phrases = &groups[0].1;
        assert_eq!(
            phrases,
            &vec!["ハラさん", "Li Yang", "こんにちは", "おはようございます", "こんばんは", "お疲れ様でした"]
        );
    }
}

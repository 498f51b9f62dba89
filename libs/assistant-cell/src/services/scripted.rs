use tracing::debug;

use crate::models::{AssistantReply, Topic, DISCLAIMER};

/// Anything that can answer a patient's free-text question.
pub trait HealthAssistant: Send + Sync {
    fn respond(&self, message: &str) -> AssistantReply;
}

struct Rule {
    keywords: &'static [&'static str],
    topic: Topic,
    reply: &'static str,
    disclaimer: bool,
}

/// Medication questions narrowed by symptom. Checked only once a message
/// is about medication.
const MEDICATION_RULES: &[Rule] = &[
    Rule {
        keywords: &["pain", "headache", "ache"],
        topic: Topic::Medication,
        reply: "For mild to moderate pain or headaches, over-the-counter options like \
acetaminophen (Tylenol) or ibuprofen (Advil, Motrin) may help. Ibuprofen also reduces \
inflammation. For persistent or severe pain, please consult your doctor.",
        disclaimer: true,
    },
    Rule {
        keywords: &["cold", "flu", "cough"],
        topic: Topic::Medication,
        reply: "For cold and flu symptoms, rest and hydration come first. Acetaminophen or \
ibuprofen help with fever and pain, decongestants with nasal congestion, and cough \
suppressants with coughing. Read labels carefully and avoid doubling up on active ingredients.",
        disclaimer: true,
    },
    Rule {
        keywords: &["allergy", "allergies", "antihistamine"],
        topic: Topic::Medication,
        reply: "For allergies, non-drowsy antihistamines like loratadine (Claritin), cetirizine \
(Zyrtec) or fexofenadine (Allegra) may help. Nasal steroid sprays like fluticasone (Flonase) \
reduce nasal inflammation. For severe allergies, please consult your doctor.",
        disclaimer: true,
    },
    Rule {
        keywords: &["sleep", "insomnia"],
        topic: Topic::Medication,
        reply: "For occasional sleep difficulties, start with good sleep hygiene. If needed, \
over-the-counter options include melatonin, diphenhydramine (Benadryl) or doxylamine (Unisom). \
For persistent insomnia, please consult your doctor.",
        disclaimer: true,
    },
    Rule {
        keywords: &["stomach", "indigestion", "heartburn"],
        topic: Topic::Medication,
        reply: "For indigestion or heartburn, antacids like Tums or Rolaids give quick, \
short-term relief. Famotidine (Pepcid) or omeprazole (Prilosec) last longer for frequent \
symptoms. For persistent digestive issues, please consult your doctor.",
        disclaimer: true,
    },
];

const MEDICATION_GENERAL: Rule = Rule {
    keywords: &[],
    topic: Topic::Medication,
    reply: "Your medications can be viewed and managed in the Medications section, where you \
can add new ones and check dosages. For suggestions about a specific condition, tell me more \
about your symptoms. Any suggestion should be discussed with your healthcare provider.",
    disclaimer: true,
};

const MEDICATION_KEYWORDS: &[&str] = &["medication", "medicine", "prescription"];

const APPOINTMENT_RULE: Rule = Rule {
    keywords: &["appointment", "schedule", "book"],
    topic: Topic::Appointments,
    reply: "You can schedule an appointment from the Appointments section. Choose 'Add New \
Appointment' and fill in the doctor, date and time. Would you like me to guide you there?",
    disclaimer: false,
};

/// Topics after medication, in priority order.
const TOPIC_RULES: &[Rule] = &[
    Rule {
        keywords: &["health advice", "healthy", "wellness", "lifestyle"],
        topic: Topic::HealthAdvice,
        reply: "Some general health recommendations:\n\n\
1. Stay active with at least 150 minutes of moderate exercise weekly\n\
2. Eat a balanced diet rich in fruits, vegetables, whole grains and lean proteins\n\
3. Drink plenty of water\n\
4. Get 7-9 hours of quality sleep each night\n\
5. Manage stress with mindfulness or other relaxation techniques\n\
6. Avoid smoking and limit alcohol\n\
7. Keep up with preventive care and regular check-ups\n\n\
Would you like more specific advice on any of these?",
        disclaimer: true,
    },
    Rule {
        keywords: &["diet", "nutrition", "food", "eat"],
        topic: Topic::Nutrition,
        reply: "A balanced diet is crucial for good health:\n\n\
1. Eat a variety of fruits and vegetables daily (5+ servings)\n\
2. Choose whole grains over refined grains\n\
3. Include lean proteins like fish, poultry, beans and nuts\n\
4. Limit saturated fats, trans fats, sodium and added sugars\n\
5. Make water your main drink\n\
6. Practice portion control\n\n\
For personalised advice, consider a registered dietitian.",
        disclaimer: true,
    },
    Rule {
        keywords: &["exercise", "workout", "fitness"],
        topic: Topic::Exercise,
        reply: "Regular physical activity is essential for health:\n\n\
1. Aim for 150 minutes of moderate or 75 minutes of vigorous aerobic activity weekly\n\
2. Add muscle-strengthening activities at least twice a week\n\
3. Start slowly and build up intensity\n\
4. Pick activities you enjoy so you keep at it\n\
5. Include flexibility and balance work, especially as you age\n\n\
Check with your healthcare provider before starting a new programme if you have existing conditions.",
        disclaimer: true,
    },
    Rule {
        keywords: &["mental health", "stress", "anxiety", "depression"],
        topic: Topic::MentalHealth,
        reply: "Mental health matters as much as physical health. Some strategies that may help:\n\n\
1. Breathing exercises, meditation or yoga\n\
2. Staying connected and asking for support\n\
3. Regular physical activity\n\
4. Enough sleep\n\
5. Mindfulness or cognitive behavioural techniques\n\
6. Limiting alcohol and avoiding recreational drugs\n\n\
If concerns persist, please reach out to a healthcare provider or mental health professional.",
        disclaimer: true,
    },
    Rule {
        keywords: &["report", "test", "result"],
        topic: Topic::Reports,
        reply: "Your medical reports are in the Reports section, where you can view, download \
and upload them. Would you like to know how to upload a new report?",
        disclaimer: false,
    },
    Rule {
        keywords: &["help", "guide", "how to"],
        topic: Topic::Help,
        reply: "I can help you find your way around the portal. Ask me about appointments, \
medications, reports or health metrics. I can also share general health information, which \
you should always discuss with your healthcare provider. What would you like to know?",
        disclaimer: false,
    },
];

const FALLBACK: Rule = Rule {
    keywords: &[],
    topic: Topic::General,
    reply: "I'm here to help with your healthcare needs. Ask me about scheduling appointments, \
managing medications, viewing reports, tracking health metrics or using the portal. How can I \
assist you today?",
    disclaimer: false,
};

/// Case-insensitive substring lookup over a fixed reply table. First match
/// wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptedAssistant;

impl ScriptedAssistant {
    pub fn new() -> Self {
        Self
    }

    fn select(query: &str) -> &'static Rule {
        if mentions(query, APPOINTMENT_RULE.keywords) {
            return &APPOINTMENT_RULE;
        }
        if mentions(query, MEDICATION_KEYWORDS) {
            return MEDICATION_RULES
                .iter()
                .find(|rule| mentions(query, rule.keywords))
                .unwrap_or(&MEDICATION_GENERAL);
        }
        TOPIC_RULES
            .iter()
            .find(|rule| mentions(query, rule.keywords))
            .unwrap_or(&FALLBACK)
    }
}

impl HealthAssistant for ScriptedAssistant {
    fn respond(&self, message: &str) -> AssistantReply {
        let query = message.to_lowercase();
        let rule = Self::select(&query);
        debug!("Assistant matched {:?}", rule.topic);

        let reply = if rule.disclaimer {
            format!("{}\n\n{}", rule.reply, DISCLAIMER)
        } else {
            rule.reply.to_string()
        };

        AssistantReply {
            topic: rule.topic,
            reply,
            disclaimer: rule.disclaimer,
        }
    }
}

fn mentions(query: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| query.contains(k))
}

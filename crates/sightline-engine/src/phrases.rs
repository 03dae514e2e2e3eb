//! Spoken phrase catalogue.
//!
//! Every user-facing message is built from a per-language template. Messages are never
//! produced in English and patched afterwards, so a label such as "bright lamp" is
//! spoken verbatim in every language.

use crate::aggregator::{Direction, Obstacle, SeenObject};
use crate::model::{Language, Mode};

/// A message the engine can speak, independent of language.
#[derive(Debug, Clone, PartialEq)]
pub enum Phrase {
    Welcome,
    /// Start message for a recognition mode.
    ModeStarted(Mode),
    ReturnedHome,
    EmergencyActivated,
    EmergencyDeactivated,
    DidNotUnderstand,
    /// Confirmation spoken in the newly selected language.
    LanguageChanged,
    StoppingApplication,
    MotionSensorUnavailable,
    NothingDetected,
    Obstacles(Vec<Obstacle>),
    ObjectsSeen(Vec<SeenObject>),
    RecognizedText(String),
    NoTextFound,
    TextRecognitionFailed,
}

impl Phrase {
    pub fn render(&self, language: Language) -> String {
        match self {
            Phrase::Welcome => welcome(language).to_string(),
            Phrase::ModeStarted(mode) => mode_started(*mode, language).to_string(),
            Phrase::ReturnedHome => returned_home(language).to_string(),
            Phrase::EmergencyActivated => match language {
                Language::English => "SOS Emergency Mode activated",
                Language::Hindi => "एसओएस आपातकालीन मोड सक्रिय",
                Language::Marathi => "एसओएस आपत्कालीन मोड सुरू",
            }
            .to_string(),
            Phrase::EmergencyDeactivated => match language {
                Language::English => "SOS Emergency Mode deactivated",
                Language::Hindi => "एसओएस आपातकालीन मोड बंद",
                Language::Marathi => "एसओएस आपत्कालीन मोड बंद",
            }
            .to_string(),
            Phrase::DidNotUnderstand => match language {
                Language::English => {
                    "I didn't understand. Try saying 'Navigate', 'Read', or 'Identify'."
                }
                Language::Hindi => "मैं समझ नहीं पाया। 'नेविगेट', 'रीड' या 'आइडेंटिफाई' कहें।",
                Language::Marathi => "मला समजले नाही. 'नेविगेट', 'रीड' किंवा 'आयडेंटिफाय' म्हणा.",
            }
            .to_string(),
            Phrase::LanguageChanged => match language {
                Language::English => "Language changed to English",
                Language::Hindi => "भाषा हिंदी में बदली गई",
                Language::Marathi => "भाषा मराठी मध्ये बदलली",
            }
            .to_string(),
            Phrase::StoppingApplication => match language {
                Language::English => "Stopping application",
                Language::Hindi => "एप्लिकेशन बंद हो रहा है",
                Language::Marathi => "अ‍ॅप्लिकेशन बंद होत आहे",
            }
            .to_string(),
            Phrase::MotionSensorUnavailable => match language {
                Language::English => {
                    "Motion sensor unavailable. Shake to call for help is disabled."
                }
                Language::Hindi => "मोशन सेंसर उपलब्ध नहीं है। हिलाकर मदद बुलाना बंद है।",
                Language::Marathi => "मोशन सेन्सर उपलब्ध नाही. हलवून मदत मागवणे बंद आहे.",
            }
            .to_string(),
            Phrase::NothingDetected => match language {
                Language::English => "No object detected",
                Language::Hindi => "कोई वस्तु नहीं मिली",
                Language::Marathi => "कोणतीही वस्तू सापडली नाही",
            }
            .to_string(),
            Phrase::Obstacles(obstacles) => obstacles
                .iter()
                .map(|o| obstacle(o, language))
                .collect::<String>(),
            Phrase::ObjectsSeen(objects) => {
                let list = objects
                    .iter()
                    .map(|o| format!("{} ({}%)", o.label, o.percent))
                    .collect::<Vec<_>>()
                    .join(", ");
                match language {
                    Language::English => format!("I can see {}", list),
                    Language::Hindi => format!("मैं देख सकता हूँ {}", list),
                    Language::Marathi => format!("मी पाहू शकतो {}", list),
                }
            }
            Phrase::RecognizedText(text) => match language {
                Language::English => format!("Recognized text: {}", text),
                Language::Hindi => format!("पहचाना गया पाठ: {}", text),
                Language::Marathi => format!("ओळखलेला मजकूर: {}", text),
            },
            Phrase::NoTextFound => match language {
                Language::English => "No text found",
                Language::Hindi => "कोई पाठ नहीं मिला",
                Language::Marathi => "मजकूर सापडला नाही",
            }
            .to_string(),
            Phrase::TextRecognitionFailed => match language {
                Language::English => "Text recognition failed",
                Language::Hindi => "पाठ पहचान विफल रही",
                Language::Marathi => "मजकूर ओळख अयशस्वी",
            }
            .to_string(),
        }
    }
}

fn welcome(language: Language) -> &'static str {
    match language {
        Language::English => {
            "Welcome to Sightline. Say 'Navigate' to detect obstacles, \
             'Read' for text recognition, or 'Identify' to identify objects around you."
        }
        Language::Hindi => {
            "साइटलाइन में आपका स्वागत है। बाधाओं का पता लगाने के लिए 'नेविगेट' कहें, \
             टेक्स्ट पहचान के लिए 'रीड', या अपने आसपास की वस्तुओं की पहचान के लिए 'आइडेंटिफाई' कहें।"
        }
        Language::Marathi => {
            "साइटलाइन मध्ये आपले स्वागत आहे। अडथळे शोधण्यासाठी 'नेविगेट' म्हणा, \
             मजकूर ओळखण्यासाठी 'रीड', किंवा आपल्या आजूबाजूच्या वस्तू ओळखण्यासाठी 'आयडेंटिफाय' म्हणा।"
        }
    }
}

fn mode_started(mode: Mode, language: Language) -> &'static str {
    match (mode, language) {
        (Mode::Navigation, Language::English) => {
            "Starting navigation mode. I will detect obstacles and guide you."
        }
        (Mode::Navigation, Language::Hindi) => {
            "नेविगेशन मोड शुरू हो रहा है। मैं बाधाओं का पता लगाकर आपका मार्गदर्शन करूँगा।"
        }
        (Mode::Navigation, Language::Marathi) => {
            "नेव्हिगेशन मोड सुरू होत आहे. मी अडथळे शोधून तुम्हाला मार्गदर्शन करेन."
        }
        (Mode::TextRecognition, Language::English) => {
            "Starting text recognition mode. Point the camera at text to read it."
        }
        (Mode::TextRecognition, Language::Hindi) => {
            "पढ़ने का मोड शुरू हो रहा है। पाठ पढ़ने के लिए कैमरे को टेक्स्ट की ओर घुमाएं।"
        }
        (Mode::TextRecognition, Language::Marathi) => {
            "वाचन मोड सुरू होत आहे। मजकूर वाचण्यासाठी कॅमेरा मजकूराकडे निर्देशित करा।"
        }
        (Mode::ObjectDetection, Language::English) => {
            "Starting object detection mode. I will identify objects around you."
        }
        (Mode::ObjectDetection, Language::Hindi) => {
            "पहचान मोड शुरू हो रहा है। मैं आपके आसपास की वस्तुओं की पहचान करूँगा।"
        }
        (Mode::ObjectDetection, Language::Marathi) => {
            "ओळख मोड सुरू होत आहे. मी तुमच्या आजूबाजूच्या वस्तू ओळखेन."
        }
        (Mode::Home, _) => returned_home(language),
        (Mode::Emergency, Language::English) => "SOS Emergency Mode activated",
        (Mode::Emergency, Language::Hindi) => "एसओएस आपातकालीन मोड सक्रिय",
        (Mode::Emergency, Language::Marathi) => "एसओएस आपत्कालीन मोड सुरू",
    }
}

fn returned_home(language: Language) -> &'static str {
    match language {
        Language::English => "Returning to home mode",
        Language::Hindi => "होम मोड पर वापस आ गए",
        Language::Marathi => "होम मोड वर परत आलो",
    }
}

fn obstacle(o: &Obstacle, language: Language) -> String {
    match language {
        Language::English => {
            let dir = match o.direction {
                Direction::Left => "left",
                Direction::Front => "front",
                Direction::Right => "right",
            };
            format!("{} ahead to the {}. ", o.label, dir)
        }
        Language::Hindi => {
            let dir = match o.direction {
                Direction::Left => "बाईं ओर",
                Direction::Front => "सामने",
                Direction::Right => "दाईं ओर",
            };
            format!("{} {} है. ", dir, o.label)
        }
        Language::Marathi => {
            let dir = match o.direction {
                Direction::Left => "डावीकडे",
                Direction::Front => "पुढे",
                Direction::Right => "उजवीकडे",
            };
            format!("{} {} आहे. ", dir, o.label)
        }
    }
}

/// Short mode label for the host's mode indicator.
pub fn mode_label(mode: Mode, language: Language) -> &'static str {
    match (mode, language) {
        (Mode::Home, Language::English) => "HOME",
        (Mode::ObjectDetection, Language::English) => "IDENTIFY",
        (Mode::TextRecognition, Language::English) => "READ",
        (Mode::Navigation, Language::English) => "NAVIGATE",
        (Mode::Emergency, Language::English) => "SOS",
        (Mode::Home, _) => "होम मोड",
        (Mode::ObjectDetection, Language::Hindi) => "पहचान मोड",
        (Mode::ObjectDetection, Language::Marathi) => "ओळख मोड",
        (Mode::TextRecognition, Language::Hindi) => "पढ़ने का मोड",
        (Mode::TextRecognition, Language::Marathi) => "वाचन मोड",
        (Mode::Navigation, _) => "नेविगेशन मोड",
        (Mode::Emergency, _) => "एसओएस मोड",
    }
}

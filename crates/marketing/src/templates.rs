//! Built-in campaign templates seeded at startup.

use tracing::info;
use uuid::Uuid;

use liyaqa_core::LiyaqaResult;

use crate::campaign::CampaignService;
use crate::types::{CampaignType, CreateCampaign, CreateStep, MarketingChannel, TriggerConfig, TriggerType};

struct StepSpec {
    name: &'static str,
    delay_days: u32,
    subject_en: &'static str,
    subject_ar: &'static str,
    body_en: &'static str,
    body_ar: &'static str,
}

struct TemplateSpec {
    name: &'static str,
    description: &'static str,
    campaign_type: CampaignType,
    trigger_type: TriggerType,
    days: Option<i64>,
    steps: &'static [StepSpec],
}

const WELCOME_STEPS: &[StepSpec] = &[
    StepSpec {
        name: "Welcome Email",
        delay_days: 0,
        subject_en: "Welcome to {{clubName}}!",
        subject_ar: "مرحباً بك في {{clubName}}!",
        body_en: "Hi {{firstName}},\n\nWelcome to {{clubName}}! Book your first class in the app, browse the schedule, and say hello to our trainers.\n\nSee you at the gym!\nThe {{clubName}} Team",
        body_ar: "مرحباً {{firstName}}،\n\nأهلاً بك في {{clubName}}! احجز حصتك الأولى من التطبيق وتعرّف على جدول الحصص ومدربينا.\n\nنراك في النادي!\nفريق {{clubName}}",
    },
    StepSpec {
        name: "Getting Started Tips",
        delay_days: 3,
        subject_en: "Tips to get the most from your membership",
        subject_ar: "نصائح للاستفادة القصوى من عضويتك",
        body_en: "Hi {{firstName}},\n\nA few tips for your first weeks: start with group classes, set realistic goals, never skip the warm-up, and stay hydrated.\n\nThe {{clubName}} Team",
        body_ar: "مرحباً {{firstName}}،\n\nبعض النصائح لأسابيعك الأولى: ابدأ بالحصص الجماعية، ضع أهدافاً واقعية، لا تتخطَّ الإحماء، واشرب الماء باستمرار.\n\nفريق {{clubName}}",
    },
    StepSpec {
        name: "Week 1 Check-in",
        delay_days: 7,
        subject_en: "How's your first week going?",
        subject_ar: "كيف يسير أسبوعك الأول؟",
        body_en: "Hi {{firstName}},\n\nIt's been a week since you joined {{clubName}}. Reply to this email and tell us how it's going.\n\nThe {{clubName}} Team",
        body_ar: "مرحباً {{firstName}}،\n\nمرّ أسبوع على انضمامك إلى {{clubName}}. رد على هذا البريد وأخبرنا عن تجربتك.\n\nفريق {{clubName}}",
    },
];

const EXPIRY_30: &[StepSpec] = &[StepSpec {
    name: "30-Day Reminder",
    delay_days: 0,
    subject_en: "Your subscription expires in 30 days",
    subject_ar: "اشتراكك ينتهي خلال 30 يوماً",
    body_en: "Hi {{firstName}},\n\nYour {{clubName}} subscription expires in 30 days. Renew early to keep your rate and your streak.\n\nThe {{clubName}} Team",
    body_ar: "مرحباً {{firstName}}،\n\nاشتراكك في {{clubName}} ينتهي خلال 30 يوماً. جدد مبكراً للحفاظ على سعرك واستمراريتك.\n\nفريق {{clubName}}",
}];

const EXPIRY_7: &[StepSpec] = &[StepSpec {
    name: "7-Day Reminder",
    delay_days: 0,
    subject_en: "Only 7 days left on your subscription!",
    subject_ar: "باقي 7 أيام فقط على اشتراكك!",
    body_en: "Hi {{firstName}},\n\nYour {{clubName}} subscription expires in 7 days. Renew today for uninterrupted access to equipment, classes, and personal training.\n\nThe {{clubName}} Team",
    body_ar: "مرحباً {{firstName}}،\n\nاشتراكك في {{clubName}} ينتهي خلال 7 أيام. جدد اليوم لضمان استمرار وصولك إلى المعدات والحصص والتدريب الشخصي.\n\nفريق {{clubName}}",
}];

const EXPIRY_1: &[StepSpec] = &[StepSpec {
    name: "Final Reminder",
    delay_days: 0,
    subject_en: "Final notice: your subscription expires tomorrow",
    subject_ar: "إشعار أخير: اشتراكك ينتهي غداً",
    body_en: "Hi {{firstName}},\n\nYour {{clubName}} subscription expires tomorrow. Renew now to avoid missing a workout.\n\nThe {{clubName}} Team",
    body_ar: "مرحباً {{firstName}}،\n\nاشتراكك في {{clubName}} ينتهي غداً. جدد الآن حتى لا يفوتك أي تمرين.\n\nفريق {{clubName}}",
}];

const WIN_BACK_7: &[StepSpec] = &[StepSpec {
    name: "We Miss You",
    delay_days: 0,
    subject_en: "We miss you at {{clubName}}",
    subject_ar: "اشتقنا إليك في {{clubName}}",
    body_en: "Hi {{firstName}},\n\nYour membership ended last week. Come back and pick up where you left off.\n\nThe {{clubName}} Team",
    body_ar: "مرحباً {{firstName}}،\n\nانتهت عضويتك الأسبوع الماضي. عد إلينا وأكمل من حيث توقفت.\n\nفريق {{clubName}}",
}];

const WIN_BACK_30: &[StepSpec] = &[StepSpec {
    name: "Come Back Offer",
    delay_days: 0,
    subject_en: "A special offer to welcome you back",
    subject_ar: "عرض خاص لعودتك",
    body_en: "Hi {{firstName}},\n\nIt's been a month. Visit the front desk for a returning-member offer.\n\nThe {{clubName}} Team",
    body_ar: "مرحباً {{firstName}}،\n\nمرّ شهر على غيابك. زر مكتب الاستقبال للحصول على عرض الأعضاء العائدين.\n\nفريق {{clubName}}",
}];

const WIN_BACK_90: &[StepSpec] = &[StepSpec {
    name: "Last Chance",
    delay_days: 0,
    subject_en: "Your fitness journey is waiting",
    subject_ar: "رحلة لياقتك بانتظارك",
    body_en: "Hi {{firstName}},\n\nThree months have passed since your membership ended. Whenever you are ready, {{clubName}} is here.\n\nThe {{clubName}} Team",
    body_ar: "مرحباً {{firstName}}،\n\nمرت ثلاثة أشهر على انتهاء عضويتك. متى ما كنت مستعداً، {{clubName}} بانتظارك.\n\nفريق {{clubName}}",
}];

const BIRTHDAY: &[StepSpec] = &[StepSpec {
    name: "Birthday Greeting",
    delay_days: 0,
    subject_en: "Happy birthday, {{firstName}}!",
    subject_ar: "عيد ميلاد سعيد يا {{firstName}}!",
    body_en: "Hi {{firstName}},\n\nEveryone at {{clubName}} wishes you a happy birthday. Enjoy a free guest pass this week.\n\nThe {{clubName}} Team",
    body_ar: "مرحباً {{firstName}}،\n\nجميع فريق {{clubName}} يتمنى لك عيد ميلاد سعيداً. استمتع بتذكرة ضيف مجانية هذا الأسبوع.\n\nفريق {{clubName}}",
}];

const INACTIVE_14: &[StepSpec] = &[StepSpec {
    name: "Two Weeks Away",
    delay_days: 0,
    subject_en: "We haven't seen you in a while",
    subject_ar: "لم نرك منذ فترة",
    body_en: "Hi {{firstName}},\n\nYou haven't visited {{clubName}} for two weeks. Book a class and get back on track.\n\nThe {{clubName}} Team",
    body_ar: "مرحباً {{firstName}}،\n\nلم تزر {{clubName}} منذ أسبوعين. احجز حصة وعد إلى المسار.\n\nفريق {{clubName}}",
}];

const INACTIVE_30: &[StepSpec] = &[StepSpec {
    name: "A Month Away",
    delay_days: 0,
    subject_en: "Let's get you moving again",
    subject_ar: "لنعد إلى الحركة من جديد",
    body_en: "Hi {{firstName}},\n\nIt's been a month since your last visit. Our trainers can build a fresh plan with you.\n\nThe {{clubName}} Team",
    body_ar: "مرحباً {{firstName}}،\n\nمرّ شهر على آخر زيارة لك. يمكن لمدربينا إعداد خطة جديدة معك.\n\nفريق {{clubName}}",
}];

const TEMPLATES: &[TemplateSpec] = &[
    TemplateSpec {
        name: "Welcome Sequence",
        description: "Welcome new members with a 3-step email sequence over 7 days",
        campaign_type: CampaignType::WelcomeSequence,
        trigger_type: TriggerType::MemberCreated,
        days: None,
        steps: WELCOME_STEPS,
    },
    TemplateSpec {
        name: "30-Day Expiry Reminder",
        description: "Remind members 30 days before their subscription expires",
        campaign_type: CampaignType::ExpiryReminder,
        trigger_type: TriggerType::DaysBeforeExpiry,
        days: Some(30),
        steps: EXPIRY_30,
    },
    TemplateSpec {
        name: "7-Day Expiry Reminder",
        description: "Reminder 7 days before the subscription expires",
        campaign_type: CampaignType::ExpiryReminder,
        trigger_type: TriggerType::DaysBeforeExpiry,
        days: Some(7),
        steps: EXPIRY_7,
    },
    TemplateSpec {
        name: "Final Expiry Reminder",
        description: "Final reminder 1 day before the subscription expires",
        campaign_type: CampaignType::ExpiryReminder,
        trigger_type: TriggerType::DaysBeforeExpiry,
        days: Some(1),
        steps: EXPIRY_1,
    },
    TemplateSpec {
        name: "7-Day Win-Back",
        description: "Reach out one week after a subscription expired",
        campaign_type: CampaignType::WinBack,
        trigger_type: TriggerType::DaysAfterExpiry,
        days: Some(7),
        steps: WIN_BACK_7,
    },
    TemplateSpec {
        name: "30-Day Win-Back",
        description: "Returning-member offer one month after expiry",
        campaign_type: CampaignType::WinBack,
        trigger_type: TriggerType::DaysAfterExpiry,
        days: Some(30),
        steps: WIN_BACK_30,
    },
    TemplateSpec {
        name: "90-Day Win-Back",
        description: "Last outreach three months after expiry",
        campaign_type: CampaignType::WinBack,
        trigger_type: TriggerType::DaysAfterExpiry,
        days: Some(90),
        steps: WIN_BACK_90,
    },
    TemplateSpec {
        name: "Birthday Greeting",
        description: "Birthday wishes on the member's birthday",
        campaign_type: CampaignType::Birthday,
        trigger_type: TriggerType::Birthday,
        days: None,
        steps: BIRTHDAY,
    },
    TemplateSpec {
        name: "14-Day Inactivity Alert",
        description: "Nudge members who have not checked in for 14 days",
        campaign_type: CampaignType::InactivityAlert,
        trigger_type: TriggerType::DaysInactive,
        days: Some(14),
        steps: INACTIVE_14,
    },
    TemplateSpec {
        name: "30-Day Inactivity Alert",
        description: "Re-engage members who have not checked in for 30 days",
        campaign_type: CampaignType::InactivityAlert,
        trigger_type: TriggerType::DaysInactive,
        days: Some(30),
        steps: INACTIVE_30,
    },
];

/// Creates the built-in templates unless any template already exists.
/// Returns how many templates were created.
pub fn seed_templates(campaigns: &CampaignService) -> LiyaqaResult<usize> {
    let existing = campaigns.list_templates().len();
    if existing > 0 {
        info!(existing, "Marketing templates already present, skipping seed");
        return Ok(0);
    }

    for spec in TEMPLATES {
        let template = campaigns.create_campaign(CreateCampaign {
            tenant_id: Uuid::nil(),
            name: spec.name.to_string(),
            description: Some(spec.description.to_string()),
            campaign_type: spec.campaign_type,
            trigger_type: spec.trigger_type,
            trigger_config: TriggerConfig {
                days: spec.days,
                ..Default::default()
            },
            segment_id: None,
            start_date: None,
            end_date: None,
            is_template: true,
        })?;
        for step in spec.steps {
            campaigns.add_step(
                template.id,
                CreateStep {
                    name: step.name.to_string(),
                    channel: MarketingChannel::Email,
                    subject_en: Some(step.subject_en.to_string()),
                    subject_ar: Some(step.subject_ar.to_string()),
                    body_en: step.body_en.to_string(),
                    body_ar: step.body_ar.to_string(),
                    delay_days: step.delay_days,
                    delay_hours: 0,
                    is_ab_test: false,
                    ab_variant: None,
                    ab_split_percentage: None,
                    step_number: None,
                },
            )?;
        }
    }

    info!(count = TEMPLATES.len(), "Seeded marketing templates");
    Ok(TEMPLATES.len())
}

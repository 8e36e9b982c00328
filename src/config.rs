//! Configuration: the label hierarchy, the pattern rule set and the decision
//! tunables, loaded once from a single YAML file at startup and immutable for
//! the process lifetime. `Config::default()` carries the full shipped
//! business hierarchy so `--generate-config` emits a working file.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::hierarchy::{LabelDef, LabelHierarchy, ValidationRule};
use crate::patterns::{MatcherDef, PatternEngine, PatternRuleDef};
use crate::rules::DecisionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Decisions below this confidence are routed to Manual Review.
    pub min_confidence: f64,
    pub thread_override: ThreadOverrideConfig,
    pub hierarchy: Vec<LabelDef>,
    pub patterns: Vec<PatternRuleDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadOverrideConfig {
    pub enabled: bool,
    /// Confidence boost applied to a prior thread classification.
    pub boost: f64,
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build the hierarchy and compile the pattern set, surfacing every
    /// integrity problem (duplicate labels, unknown pattern targets, bad
    /// regexes) as a startup-time error.
    pub fn build(&self) -> anyhow::Result<(Arc<LabelHierarchy>, PatternEngine)> {
        let hierarchy = Arc::new(LabelHierarchy::from_defs(&self.hierarchy)?);
        let patterns = PatternEngine::new(&self.patterns, &hierarchy)?;
        Ok((hierarchy, patterns))
    }

    pub fn decision_config(&self) -> DecisionConfig {
        DecisionConfig {
            min_confidence: self.min_confidence,
            thread_override_enabled: self.thread_override.enabled,
            thread_boost: self.thread_override.boost,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_confidence: 0.6,
            thread_override: ThreadOverrideConfig {
                enabled: true,
                boost: 0.1,
            },
            hierarchy: default_hierarchy(),
            patterns: default_patterns(),
        }
    }
}

fn default_hierarchy() -> Vec<LabelDef> {
    vec![
        LabelDef::new("Manual Review", "Cases requiring human attention").with_children(vec![
            LabelDef::new("Partial/Disputed Payment", "Payment disputes and partial payments"),
            LabelDef::new("Invoice Receipt", "Invoice proof provided").with_rules(vec![
                ValidationRule::RequiresEntity {
                    entity: "attachment_ref".to_string(),
                },
            ]),
            LabelDef::new("Closure Notification", "Business closure notices"),
            LabelDef::new("Closure + Payment Due", "Closure with outstanding dues"),
            LabelDef::new("External Submission", "Invoice issues from third parties"),
            LabelDef::new("Invoice Errors", "Missing fields or invalid formats"),
            LabelDef::new("Inquiry/Redirection", "Redirections and alternate contacts"),
            LabelDef::new("Complex Queries", "Multiple topics requiring review"),
        ]),
        LabelDef::new("No Reply", "System-generated and informational mail").with_children(vec![
            LabelDef::new("System Notifications", "System and business notifications"),
            LabelDef::new("Sales/Offers", "Promotions and marketing"),
            LabelDef::new("Processing Errors", "System failure notifications"),
            LabelDef::new("General Thank You", "Acknowledgments"),
            LabelDef::new("Ticket Created", "New ticket notifications"),
            LabelDef::new("Ticket Resolved", "Closed ticket notifications"),
        ]),
        LabelDef::new("Invoices Request", "Requests for invoice information").with_children(vec![
            LabelDef::new("Invoice Copies", "Requests for invoice copies"),
            LabelDef::new("Request (No Info)", "Invoice request missing details"),
        ]),
        LabelDef::new("Payments Claim", "Claims related to payments").with_children(vec![
            LabelDef::new("Claims Paid (No Info)", "Payment claims without proof"),
            LabelDef::new("Payment Details", "Payment details for manual check"),
            LabelDef::new("Payment Confirmation", "Payment proof provided").with_rules(vec![
                ValidationRule::RequiresEntity {
                    entity: "payment_proof".to_string(),
                },
            ]),
        ]),
        LabelDef::new("Auto Reply", "Automated responses").with_children(vec![
            LabelDef::new("Out of Office", "Generic out-of-office messages"),
            LabelDef::new("With Alternate Contact", "OOO with alternative contact"),
            LabelDef::new("Return Date Specified", "OOO with return date"),
            LabelDef::new("Survey", "Feedback requests"),
            LabelDef::new("Redirects/Updates", "Contact or property changes"),
        ]),
        LabelDef::new("Uncategorized", "Flag for review/retraining"),
    ]
}

fn default_patterns() -> Vec<PatternRuleDef> {
    let regex_rule = |name: &str,
                      category: &str,
                      subcategory: &str,
                      confidence: f64,
                      priority: i32,
                      patterns: &[&str]| PatternRuleDef {
        name: name.to_string(),
        category: category.to_string(),
        subcategory: Some(subcategory.to_string()),
        confidence,
        priority,
        matcher: MatcherDef::Regex {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        },
    };
    let keyword_rule = |name: &str,
                        category: &str,
                        subcategory: &str,
                        confidence: f64,
                        priority: i32,
                        keywords: &[&str]| PatternRuleDef {
        name: name.to_string(),
        category: category.to_string(),
        subcategory: Some(subcategory.to_string()),
        confidence,
        priority,
        matcher: MatcherDef::AnyKeyword {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        },
    };

    vec![
        regex_rule(
            "disputed-payment",
            "Manual Review",
            "Partial/Disputed Payment",
            0.88,
            90,
            &[
                r"amount.*is.*in.*dispute",
                r"balance.*is.*not.*(ours|accurate)",
                r"not.*our.*responsibility",
                r"do.*not.*owe",
                r"formally.*disputing",
                r"disput(e|ing).*(this.*debt|these.*charges|payment|billing)",
                r"partial.*payment",
                r"contested.*payment",
                r"billing.*error",
                r"billed.*to.*wrong",
                r"wrong.*(entity|party)",
                r"charge.*is.*bogus",
                r"breach.*of.*contract",
            ],
        ),
        keyword_rule(
            "legal-communication",
            "Manual Review",
            "Complex Queries",
            0.9,
            88,
            &[
                "attorney",
                "law firm",
                "attorney at law",
                "legal counsel",
                "legal representation",
                "cease and desist",
            ],
        ),
        regex_rule(
            "payment-confirmation",
            "Payments Claim",
            "Payment Confirmation",
            0.86,
            85,
            &[
                r"proof.*of.*payment",
                r"payment.*confirmation",
                r"check.*number",
                r"eft#",
                r"confirmation.*#",
                r"here.*is.*proof",
                r"attached.*proof",
                r"payment.*evidence",
                r"transaction.*id",
                r"payment.*reference",
                r"cleared.*bank",
                r"paid.*via.*(transaction|batch).*number",
                r"receipt.*for",
            ],
        ),
        regex_rule(
            "processing-errors",
            "No Reply",
            "Processing Errors",
            0.84,
            80,
            &[
                r"pdf.*file.*is.*not.*attached",
                r"processing.*error",
                r"cannot.*be.*processed",
                r"electronic.*invoice.*rejected",
                r"failed.*to.*process",
                r"mail.*delivery.*failed",
                r"delivery.*failure",
                r"message.*undelivered",
                r"unable.*to.*process",
            ],
        ),
        regex_rule(
            "invoice-request",
            "Invoices Request",
            "Invoice Copies",
            0.82,
            70,
            &[
                r"provide.*(me|us).*with.*outstanding.*invoices",
                r"send.*(me|us).*copies.*of.*any.*invoices",
                r"can.*you.*send.*the.*invoice",
                r"need.*invoice.*copy",
                r"copy.*of.*invoice",
                r"please.*(send|provide).*invoice",
                r"outstanding.*invoices.*owed",
                r"invoice.*request",
            ],
        ),
        regex_rule(
            "claims-paid",
            "Payments Claim",
            "Claims Paid (No Info)",
            0.8,
            65,
            &[
                r"(its|it).*been.*paid",
                r"has.*been.*settled",
                r"already.*paid",
                r"payment.*was.*(made|sent)",
                r"we.*(paid|sent.*payment)",
                r"bill.*was.*paid",
                r"paid.*(directly.*to|by.*credit.*card|by.*check|via|through|on)",
                r"sent.*check",
                r"made.*payment",
                r"remitted",
                r"account.*paid",
                r"payment.*(completed|processed)",
                r"ach.*payment",
                r"wired.*payment",
            ],
        ),
        regex_rule(
            "payment-details",
            "Payments Claim",
            "Payment Details",
            0.76,
            60,
            &[
                r"payment.*will.*be.*sent",
                r"payment.*is.*being.*processed",
                r"check.*will.*be.*mailed",
                r"payment.*scheduled",
                r"payment.*timeline",
                r"remittance.*info",
                r"payment.*breakdown",
                r"waiting.*(to.*receive|for).*payment",
                r"payment.*delayed.*due.*to",
            ],
        ),
        regex_rule(
            "invoice-receipt",
            "Manual Review",
            "Invoice Receipt",
            0.8,
            58,
            &[
                r"invoice.*(is.*)?attached",
                r"see.*attached.*invoice",
                r"here.*is.*invoice",
                r"proof.*of.*invoice",
                r"copy.*of.*invoice.*attached",
                r"invoice.*documentation",
            ],
        ),
        regex_rule(
            "closure-payment-due",
            "Manual Review",
            "Closure + Payment Due",
            0.8,
            55,
            &[
                r"closed.*payment.*due",
                r"business.*closed.*outstanding",
                r"closure.*payment.*required",
                r"bankruptcy.*payment",
            ],
        ),
        regex_rule(
            "closure-notification",
            "Manual Review",
            "Closure Notification",
            0.76,
            50,
            &[
                r"business.*closed",
                r"company.*closed",
                r"out.*of.*business",
                r"ceased.*operations",
                r"filed.*bankruptcy",
                r"chapter.*(7|11)",
            ],
        ),
        regex_rule(
            "external-submission",
            "Manual Review",
            "External Submission",
            0.76,
            50,
            &[
                r"invoice.*(issue|problem)",
                r"(import|submission).*failed",
                r"failed.*to.*import",
                r"unable.*to.*import",
                r"documents.*not.*processed",
                r"error.*importing",
            ],
        ),
        regex_rule(
            "invoice-errors",
            "Manual Review",
            "Invoice Errors",
            0.75,
            48,
            &[
                r"missing.*field",
                r"format.*(mismatch|error)",
                r"incomplete.*invoice",
                r"required.*field",
                r"invoice.*format.*issue",
            ],
        ),
        regex_rule(
            "inquiry-redirection",
            "Manual Review",
            "Inquiry/Redirection",
            0.72,
            45,
            &[
                r"insufficient.*data.*provided",
                r"i.*need.*guidance",
                r"please.*advise.*what.*is.*needed",
                r"(redirect|forward).*to",
                r"contact.*instead",
                r"please.*(check|refer).*(with|to)",
                r"what.*documentation.*needed",
                r"(how|where).*(should.*we.*pay|to.*send.*payment)",
                r"verify.*(legitimate|authenticity)",
                r"looks.*like.*a.*scam",
            ],
        ),
        regex_rule(
            "ooo-with-contact",
            "Auto Reply",
            "With Alternate Contact",
            0.85,
            42,
            &[
                r"out.*of.*office.*(contact|reach.*out)",
                r"if.*you.*need.*immediate.*assistance",
                r"urgent.*please.*contact",
                r"alternate.*contact",
                r"call.*my.*(cell|mobile)",
            ],
        ),
        regex_rule(
            "ooo-return-date",
            "Auto Reply",
            "Return Date Specified",
            0.8,
            40,
            &[
                r"out.*of.*office.*until",
                r"will.*(return|be.*back).*on",
                r"available.*after",
                r"out.*until.*\w+",
                r"when.*i.*return",
            ],
        ),
        regex_rule(
            "ooo-generic",
            "Auto Reply",
            "Out of Office",
            0.78,
            36,
            &[
                r"out.*of.*(the.*)?office",
                r"automatic.*reply",
                r"auto-?reply",
                r"i.*am.*currently.*out",
                r"away.*from.*desk",
                r"limited.*access.*to.*(my.*)?email",
                r"on.*(vacation|leave)",
                r"do.*not.*reply",
                r"no-?reply",
                r"automated.*response",
            ],
        ),
        regex_rule(
            "tickets-created",
            "No Reply",
            "Ticket Created",
            0.8,
            34,
            &[
                r"ticket.*(has.*been.*)?created",
                r"case.*opened",
                r"new.*ticket",
                r"case.*number.*is",
                r"support.*(request|ticket).*(created|opened)",
            ],
        ),
        regex_rule(
            "tickets-resolved",
            "No Reply",
            "Ticket Resolved",
            0.8,
            34,
            &[
                r"ticket.*(has.*been.*)?resolved",
                r"case.*(closed|resolved)",
                r"case.*is.*now.*closed",
                r"marked.*as.*resolved",
                r"request.*completed",
            ],
        ),
        regex_rule(
            "survey",
            "Auto Reply",
            "Survey",
            0.76,
            30,
            &[
                r"take.*(our|short).*survey",
                r"feedback.*request",
                r"rate.*our.*service",
                r"customer.*satisfaction",
                r"complete.*the.*(online.*)?survey",
                r"appreciate.*your.*feedback",
            ],
        ),
        regex_rule(
            "redirects-updates",
            "Auto Reply",
            "Redirects/Updates",
            0.76,
            30,
            &[
                r"is.*no.*longer.*with",
                r"direct.*all.*future.*inquiries.*to",
                r"no.*longer.*employed",
                r"contact.*the.*vendor.*directly",
                r"no.*longer.*be.*accepted",
                r"please.*submit.*all.*future",
                r"new.*contact",
                r"property.*manager",
            ],
        ),
        regex_rule(
            "sales-offers",
            "No Reply",
            "Sales/Offers",
            0.75,
            26,
            &[
                r"special.*offer",
                r"limited.*time.*offer",
                r"promotional.*offer",
                r"discount.*offer",
                r"exclusive.*deal",
                r"flash.*sale",
            ],
        ),
        regex_rule(
            "system-alerts",
            "No Reply",
            "System Notifications",
            0.75,
            26,
            &[
                r"system.*(notification|alert)",
                r"automated.*notification",
                r"maintenance.*notification",
                r"service.*update",
                r"security.*alert",
                r"backup.*completed",
            ],
        ),
        regex_rule(
            "general-thank-you",
            "No Reply",
            "General Thank You",
            0.7,
            20,
            &[
                r"thank.*you.*for.*(your.*email|contacting)",
                r"thanks.*for.*your.*email",
                r"we.*are.*reviewing",
                r"currently.*reviewing",
                r"under.*review",
                r"will.*get.*back.*to.*you",
            ],
        ),
    ]
}

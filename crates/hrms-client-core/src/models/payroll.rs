use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayrollStatus {
    Draft,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeductionType {
    BenefitPremium,
    RetirementContribution,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxType {
    Federal,
    State,
    Local,
    Fica,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deduction {
    pub id: String,
    pub name: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub deduction_type: DeductionType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tax {
    pub id: String,
    pub name: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub tax_type: TaxType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payroll {
    pub id: String,
    pub employee_id: String,
    pub period_start: String,
    pub period_end: String,
    pub base_pay: f64,
    pub overtime: f64,
    #[serde(default)]
    pub deductions: Vec<Deduction>,
    #[serde(default)]
    pub taxes: Vec<Tax>,
    pub net_pay: f64,
    pub status: PayrollStatus,
}

impl Payroll {
    pub fn gross_pay(&self) -> f64 {
        self.base_pay + self.overtime
    }

    pub fn total_deductions(&self) -> f64 {
        self.deductions.iter().map(|d| d.amount).sum()
    }

    pub fn total_taxes(&self) -> f64 {
        self.taxes.iter().map(|t| t.amount).sum()
    }
}

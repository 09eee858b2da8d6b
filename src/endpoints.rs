use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::query::QueryParams;

pub const DEFAULT_API_BASE: &str = "https://data.gcis.nat.gov.tw/od/data/api";

/// 核准設立: registration approved, the company is active.
pub const DEFAULT_COMPANY_STATUS: &str = "01";

/// Characters left unescaped in a company-name filter value: the RFC 3986
/// unreserved set plus `/`.
const NAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// One of the GCIS open-data APIs queried with an OData-style `$filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// 公司登記基本資料-應用一
    CompanyByBusinessNo,
    /// 公司登記關鍵字查詢
    CompanyByName,
    /// 公司登記董監事資料
    BodByBusinessNo,
}

impl Endpoint {
    fn resource_id(&self) -> &'static str {
        match self {
            Endpoint::CompanyByBusinessNo => "5F64D864-61CB-4D0D-8AD9-492047CC1EA6",
            Endpoint::CompanyByName => "6BBA2268-1367-4B42-9CCA-BC17499EBE8C",
            Endpoint::BodByBusinessNo => "4E5F7653-1B91-4DDC-99D5-468530FAE396",
        }
    }

    fn filter(&self) -> &'static str {
        match self {
            Endpoint::CompanyByBusinessNo | Endpoint::BodByBusinessNo => {
                "Business_Accounting_NO%20eq%20{business_no}"
            }
            Endpoint::CompanyByName => {
                "Company_Name%20like%20{company_name}%20and%20Company_Status%20eq%20{company_status}"
            }
        }
    }

    /// URL template with `{skip}` and `{top}` left for the pager.
    pub fn template(&self, api_base: &str) -> String {
        format!(
            "{}/{}?$format=json&$filter={}&$skip={{skip}}&$top={{top}}",
            api_base.trim_end_matches('/'),
            self.resource_id(),
            self.filter()
        )
    }
}

pub fn business_no_params(business_no: &str) -> QueryParams {
    QueryParams::from([("business_no".to_string(), business_no.to_string())])
}

pub fn company_name_params(company_name: &str, company_status: &str) -> QueryParams {
    QueryParams::from([
        ("company_name".to_string(), escape_name(company_name)),
        ("company_status".to_string(), company_status.to_string()),
    ])
}

pub fn escape_name(value: &str) -> String {
    utf8_percent_encode(value, NAME_ESCAPE).to_string()
}

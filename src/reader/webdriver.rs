//! WebDriver-backed page reader
//!
//! Drives the one live browser session through a WebDriver endpoint. All
//! site selectors are confined to this module; the crawl core never sees
//! them. Auxiliary lookups (product category, thumbnail) run in a separate
//! browser window that is torn down before control returns, so the primary
//! listing view survives every call.

use crate::model::{LineItem, OrderDetail, OrderInfo, OrderKind, ORDERS_PER_PAGE};
use crate::reader::{CodeOutcome, LoginStep, NavError, NavResult, PageReader, PageSnapshot};
use chrono::{NaiveDate, NaiveDateTime};
use fantoccini::error::CmdError;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder, Locator};
use std::time::Duration;

/// Upper bound on any single wait for a readiness marker. A stuck wait is
/// surfaced as a timeout, never retried in place.
const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settle time after a page reports ready; the listing re-renders briefly.
const SETTLE: Duration = Duration::from_secs(1);

// ===== Listing page selectors =====
const READY_MARKER: &str = "div.front-delivery-display";
const YEAR_OPTIONS: &str = "select#year option";
const ORDER_COUNT: &str = ".elResultCount .elCount";
const ORDER_GROUP: &str = "li.elOrderItem";
const GROUP_DATE: &str = "p.elDate span";
const ORDER_ROW: &str = "li.elItemList";
const ROW_BUTTON: &str = "div.elControl p.elButton a";
const ROW_BUTTON_LABEL: &str = "div.elControl p.elButton a span";
const ROW_ORDER_NO: &str = "dd.elOrderData";
const ROW_SELLER: &str = "div.elStoreInfo p.elName a span";
const TAX_BUTTON_LABEL: &str = "寄付詳細";

// ===== Order detail selectors =====
const DETAIL_DATE: &str = "div.elOrderInfo p.elOrderDate";
const DETAIL_ITEM: &str = "div.mdOrderItem div.elItem ul.elList > li";
const ITEM_NAME: &str = "dl.elDetail dd.elName a span";
const ITEM_LINK: &str = "dl.elDetail dd.elName a";
const ITEM_PRICE: &str = "dd.elInfo span.elPrice";
const ITEM_COUNT: &str = "dd.elInfo span.elNum";
const ITEM_IMAGE: &str = "dl.elDetail dt.elImage a img";

// ===== Product page selectors =====
const PRODUCT_READY: &str = "div[class*='Masthead']";
const BREADCRUMB: &str = "div[id*='bclst'] ol li";

// ===== Login selectors =====
const LOGIN_LINK: &str = r#"//p[contains(@class, "elButton")]/a/span[contains(text(), "ログイン")]"#;
const LOGIN_BOX: &str = "div.loginAreaBox";
const LOGIN_HANDLE: &str = "input#login_handle";
const LOGIN_NEXT: &str = r#"//button[@type="button" and contains(text(), "次へ")]"#;
const LOGIN_SEND_CODE: &str = r#"//button[@type="submit" and contains(text(), "確認コードを送信")]"#;
const LOGIN_RATE_LIMITED: &str =
    r#"//div[contains(@class, "errorMessage")]/span[contains(text(), "時間をおいてから再度")]"#;
const LOGIN_CODE: &str = "input#code";
const LOGIN_SUBMIT: &str = r#"//button[@type="submit" and contains(text(), "ログイン")]"#;
const IDENTITY_MAIL_RADIO: &str = r#"//span[contains(@class, "ar-radio_label") and contains(text(), "メールアドレス")]/following-sibling::div[contains(@class, "ar-radio_focus")]"#;
const IDENTITY_ANSWER: &str = "input[name='aq_answer']";
const IDENTITY_SUBMIT: &str = r#"//button[@type="submit" and contains(text(), "入力する")]"#;

/// Page reader backed by a WebDriver browser session
pub struct WebDriverReader {
    client: Client,
    history_url: String,
}

impl WebDriverReader {
    /// Connects to a WebDriver endpoint and starts a fresh browser session
    pub async fn connect(webdriver_url: &str, history_url: &str) -> NavResult<Self> {
        let client = ClientBuilder::native()
            .connect(webdriver_url)
            .await
            .map_err(|e| NavError::Session {
                message: format!("WebDriver connect failed: {}", e),
            })?;

        Ok(Self {
            client,
            history_url: history_url.to_string(),
        })
    }

    /// Ends the browser session
    pub async fn close(self) -> NavResult<()> {
        self.client.close().await.map_err(|e| NavError::Session {
            message: e.to_string(),
        })
    }

    fn classify(target: &str, locator: &str, e: CmdError) -> NavError {
        if e.is_no_such_element() {
            NavError::ElementMissing {
                target: target.to_string(),
                locator: locator.to_string(),
            }
        } else if matches!(e, CmdError::WaitTimeout) {
            NavError::Timeout {
                target: target.to_string(),
            }
        } else {
            NavError::Session {
                message: format!("{}: {}", target, e),
            }
        }
    }

    fn hist_url(&self, year: Option<i32>, page: u32) -> String {
        let first_order = ORDERS_PER_PAGE * (page - 1) + 1;
        match year {
            Some(year) => format!(
                "{}?year={}&firstorder={}",
                self.history_url, year, first_order
            ),
            None => format!("{}?year=&firstorder={}", self.history_url, first_order),
        }
    }

    async fn goto_and_wait(&mut self, url: &str, marker: &str, target: &str) -> NavResult<()> {
        self.client
            .goto(url)
            .await
            .map_err(|e| Self::classify(target, url, e))?;
        self.wait_for(Locator::Css(marker), target).await?;
        Ok(())
    }

    async fn wait_for(&mut self, locator: Locator<'_>, target: &str) -> NavResult<()> {
        self.client
            .wait()
            .at_most(WAIT_TIMEOUT)
            .for_element(locator)
            .await
            .map_err(|e| Self::classify(target, &format!("{:?}", locator), e))?;
        tokio::time::sleep(SETTLE).await;
        Ok(())
    }

    async fn exists(&mut self, locator: Locator<'_>, target: &str) -> NavResult<bool> {
        let found = self
            .client
            .find_all(locator)
            .await
            .map_err(|e| Self::classify(target, &format!("{:?}", locator), e))?;
        Ok(!found.is_empty())
    }

    async fn click(&mut self, locator: Locator<'_>, target: &str) -> NavResult<()> {
        let element = self
            .client
            .find(locator)
            .await
            .map_err(|e| Self::classify(target, &format!("{:?}", locator), e))?;
        element
            .click()
            .await
            .map_err(|e| Self::classify(target, &format!("{:?}", locator), e))
    }

    async fn type_into(&mut self, locator: Locator<'_>, text: &str, target: &str) -> NavResult<()> {
        let element = self
            .client
            .find(locator)
            .await
            .map_err(|e| Self::classify(target, &format!("{:?}", locator), e))?;
        element
            .send_keys(text)
            .await
            .map_err(|e| Self::classify(target, &format!("{:?}", locator), e))
    }

    /// Opens an auxiliary window and switches into it, returning the
    /// primary window's handle for [`Self::close_aux`].
    async fn open_aux(&mut self, target: &str) -> NavResult<WindowHandle> {
        let primary = self
            .client
            .window()
            .await
            .map_err(|e| Self::classify(target, "window", e))?;
        let aux = self
            .client
            .new_window(true)
            .await
            .map_err(|e| Self::classify(target, "new_window", e))?;
        self.client
            .switch_to_window(aux.handle)
            .await
            .map_err(|e| Self::classify(target, "switch_to_window", e))?;
        Ok(primary)
    }

    /// Closes the auxiliary window and restores the primary one
    async fn close_aux(&mut self, primary: WindowHandle, target: &str) -> NavResult<()> {
        self.client
            .close_window()
            .await
            .map_err(|e| Self::classify(target, "close_window", e))?;
        self.client
            .switch_to_window(primary)
            .await
            .map_err(|e| Self::classify(target, "switch_to_window", e))?;
        Ok(())
    }

    async fn category_in_aux(&mut self, item_url: &str) -> NavResult<Vec<String>> {
        const TARGET: &str = "product page";

        self.goto_and_wait(item_url, PRODUCT_READY, TARGET).await?;

        let crumbs = self
            .client
            .find_all(Locator::Css(BREADCRUMB))
            .await
            .map_err(|e| Self::classify(TARGET, BREADCRUMB, e))?;

        let mut category = Vec::with_capacity(crumbs.len());
        for crumb in crumbs {
            let text = crumb
                .text()
                .await
                .map_err(|e| Self::classify(TARGET, BREADCRUMB, e))?;
            category.push(text);
        }

        Ok(category)
    }

    async fn thumbnail_in_aux(&mut self, thumb_url: &str) -> NavResult<Vec<u8>> {
        const TARGET: &str = "thumbnail";

        self.client
            .goto(thumb_url)
            .await
            .map_err(|e| Self::classify(TARGET, thumb_url, e))?;
        self.wait_for(Locator::Css("img"), TARGET).await?;

        let image = self
            .client
            .find(Locator::Css("img"))
            .await
            .map_err(|e| Self::classify(TARGET, "img", e))?;

        image
            .screenshot()
            .await
            .map_err(|e| Self::classify(TARGET, "img", e))
    }

    async fn parse_line_item(
        &mut self,
        row: &fantoccini::elements::Element,
    ) -> NavResult<LineItem> {
        const TARGET: &str = "order detail";

        let err = |locator: &str, e: CmdError| Self::classify(TARGET, locator, e);

        let name = row
            .find(Locator::Css(ITEM_NAME))
            .await
            .map_err(|e| err(ITEM_NAME, e))?
            .text()
            .await
            .map_err(|e| err(ITEM_NAME, e))?;

        let url = row
            .find(Locator::Css(ITEM_LINK))
            .await
            .map_err(|e| err(ITEM_LINK, e))?
            .attr("href")
            .await
            .map_err(|e| err(ITEM_LINK, e))?
            .ok_or_else(|| NavError::Parse {
                target: TARGET.to_string(),
                message: format!("item '{}' has no product link", name),
            })?;

        let price_text = row
            .find(Locator::Css(ITEM_PRICE))
            .await
            .map_err(|e| err(ITEM_PRICE, e))?
            .text()
            .await
            .map_err(|e| err(ITEM_PRICE, e))?;
        let price = parse_number(&price_text).ok_or_else(|| NavError::Parse {
            target: TARGET.to_string(),
            message: format!("unreadable price '{}'", price_text),
        })?;

        let count_text = row
            .find(Locator::Css(ITEM_COUNT))
            .await
            .map_err(|e| err(ITEM_COUNT, e))?
            .text()
            .await
            .map_err(|e| err(ITEM_COUNT, e))?;
        let quantity = parse_number(&count_text).ok_or_else(|| NavError::Parse {
            target: TARGET.to_string(),
            message: format!("unreadable quantity '{}'", count_text),
        })? as u32;

        let thumb_url = row
            .find(Locator::Css(ITEM_IMAGE))
            .await
            .map_err(|e| err(ITEM_IMAGE, e))?
            .attr("src")
            .await
            .map_err(|e| err(ITEM_IMAGE, e))?
            .unwrap_or_default();

        Ok(LineItem {
            name,
            price,
            quantity,
            url,
            thumb_url,
        })
    }
}

impl PageReader for WebDriverReader {
    async fn goto_history_home(&mut self) -> NavResult<()> {
        let url = self.hist_url(None, 1);
        self.goto_and_wait(&url, READY_MARKER, "order history home")
            .await
    }

    async fn read_year_list(&mut self) -> NavResult<Vec<i32>> {
        const TARGET: &str = "order history home";

        let options = self
            .client
            .find_all(Locator::Css(YEAR_OPTIONS))
            .await
            .map_err(|e| Self::classify(TARGET, YEAR_OPTIONS, e))?;

        let mut years = Vec::new();
        for option in options {
            let value = option
                .attr("value")
                .await
                .map_err(|e| Self::classify(TARGET, YEAR_OPTIONS, e))?;
            // The selector also carries an empty "all years" entry.
            if let Some(year) = value.and_then(|v| v.parse::<i32>().ok()) {
                years.push(year);
            }
        }

        if years.is_empty() {
            return Err(NavError::Parse {
                target: TARGET.to_string(),
                message: "year selector offered no years".to_string(),
            });
        }

        years.sort_unstable();
        Ok(years)
    }

    async fn goto_order_page(&mut self, year: i32, page: u32) -> NavResult<()> {
        let url = self.hist_url(Some(year), page);
        self.goto_and_wait(&url, READY_MARKER, "order listing").await
    }

    async fn read_order_count(&mut self) -> NavResult<u32> {
        const TARGET: &str = "order listing";

        let text = self
            .client
            .find(Locator::Css(ORDER_COUNT))
            .await
            .map_err(|e| Self::classify(TARGET, ORDER_COUNT, e))?
            .text()
            .await
            .map_err(|e| Self::classify(TARGET, ORDER_COUNT, e))?;

        parse_number(&text)
            .map(|n| n as u32)
            .ok_or_else(|| NavError::Parse {
                target: TARGET.to_string(),
                message: format!("unreadable order count '{}'", text),
            })
    }

    async fn read_order_rows(&mut self) -> NavResult<Vec<OrderInfo>> {
        const TARGET: &str = "order listing";

        let err = |locator: &str, e: CmdError| Self::classify(TARGET, locator, e);

        let groups = self
            .client
            .find_all(Locator::Css(ORDER_GROUP))
            .await
            .map_err(|e| err(ORDER_GROUP, e))?;

        let mut orders = Vec::new();
        for group in groups {
            let date_text = group
                .find(Locator::Css(GROUP_DATE))
                .await
                .map_err(|e| err(GROUP_DATE, e))?
                .text()
                .await
                .map_err(|e| err(GROUP_DATE, e))?;
            let date = parse_date(&date_text).ok_or_else(|| NavError::Parse {
                target: TARGET.to_string(),
                message: format!("unreadable order date '{}'", date_text),
            })?;

            let rows = group
                .find_all(Locator::Css(ORDER_ROW))
                .await
                .map_err(|e| err(ORDER_ROW, e))?;

            for row in rows {
                let action = row
                    .find(Locator::Css(ROW_BUTTON))
                    .await
                    .map_err(|e| err(ROW_BUTTON, e))?
                    .attr("onclick")
                    .await
                    .map_err(|e| err(ROW_BUTTON, e))?
                    .ok_or_else(|| NavError::Parse {
                        target: TARGET.to_string(),
                        message: "order row button has no action handle".to_string(),
                    })?;

                let label = row
                    .find(Locator::Css(ROW_BUTTON_LABEL))
                    .await
                    .map_err(|e| err(ROW_BUTTON_LABEL, e))?
                    .text()
                    .await
                    .map_err(|e| err(ROW_BUTTON_LABEL, e))?;
                let kind = if label.contains(TAX_BUTTON_LABEL) {
                    OrderKind::TaxDonation
                } else {
                    OrderKind::Normal
                };

                let order_no = row
                    .find(Locator::Css(ROW_ORDER_NO))
                    .await
                    .map_err(|e| err(ROW_ORDER_NO, e))?
                    .text()
                    .await
                    .map_err(|e| err(ROW_ORDER_NO, e))?
                    .trim()
                    .to_string();

                let seller = row
                    .find(Locator::Css(ROW_SELLER))
                    .await
                    .map_err(|e| err(ROW_SELLER, e))?
                    .text()
                    .await
                    .map_err(|e| err(ROW_SELLER, e))?;

                orders.push(OrderInfo {
                    order_no,
                    seller,
                    date,
                    kind,
                    action,
                });
            }
        }

        Ok(orders)
    }

    async fn open_order(&mut self, order: &OrderInfo) -> NavResult<OrderDetail> {
        const TARGET: &str = "order detail";

        self.client
            .execute(&order.action, Vec::new())
            .await
            .map_err(|e| Self::classify(TARGET, "action handle", e))?;
        self.wait_for(Locator::Css(READY_MARKER), TARGET).await?;

        let date_label = self
            .client
            .find(Locator::Css(DETAIL_DATE))
            .await
            .map_err(|e| Self::classify(TARGET, DETAIL_DATE, e))?
            .text()
            .await
            .map_err(|e| Self::classify(TARGET, DETAIL_DATE, e))?;

        let ordered_at = date_label
            .split_once("日時：")
            .and_then(|(_, text)| parse_datetime(text))
            .ok_or_else(|| NavError::Parse {
                target: TARGET.to_string(),
                message: format!("unreadable order timestamp '{}'", date_label),
            })?;

        let rows = self
            .client
            .find_all(Locator::Css(DETAIL_ITEM))
            .await
            .map_err(|e| Self::classify(TARGET, DETAIL_ITEM, e))?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in &rows {
            lines.push(self.parse_line_item(row).await?);
        }

        Ok(OrderDetail { ordered_at, lines })
    }

    async fn close_order(&mut self) -> NavResult<()> {
        const TARGET: &str = "order listing";

        self.client
            .back()
            .await
            .map_err(|e| Self::classify(TARGET, "history back", e))?;
        self.wait_for(Locator::Css(READY_MARKER), TARGET).await
    }

    async fn item_category(&mut self, item_url: &str) -> NavResult<Vec<String>> {
        let primary = self.open_aux("product page").await?;
        let result = self.category_in_aux(item_url).await;
        let teardown = self.close_aux(primary, "product page").await;

        let category = result?;
        teardown?;
        Ok(category)
    }

    async fn thumbnail(&mut self, thumb_url: &str) -> NavResult<Vec<u8>> {
        let primary = self.open_aux("thumbnail").await?;
        let result = self.thumbnail_in_aux(thumb_url).await;
        let teardown = self.close_aux(primary, "thumbnail").await;

        let png = result?;
        teardown?;
        Ok(png)
    }

    async fn logged_out(&mut self) -> NavResult<bool> {
        self.exists(Locator::XPath(LOGIN_LINK), "session check").await
    }

    async fn begin_login(&mut self, user: &str) -> NavResult<LoginStep> {
        const TARGET: &str = "login";

        self.click(Locator::XPath(LOGIN_LINK), TARGET).await?;
        self.wait_for(Locator::Css(LOGIN_BOX), TARGET).await?;

        self.type_into(Locator::Css(LOGIN_HANDLE), user, TARGET)
            .await?;
        self.click(Locator::XPath(LOGIN_NEXT), TARGET).await?;
        self.wait_for(Locator::Css(LOGIN_BOX), TARGET).await?;

        self.click(Locator::XPath(LOGIN_SEND_CODE), TARGET).await?;
        self.wait_for(Locator::Css(LOGIN_BOX), TARGET).await?;

        if self
            .exists(Locator::XPath(LOGIN_RATE_LIMITED), TARGET)
            .await?
        {
            return Ok(LoginStep::RateLimited);
        }

        Ok(LoginStep::CodeSent)
    }

    async fn submit_code(&mut self, code: &str) -> NavResult<CodeOutcome> {
        const TARGET: &str = "login";

        self.type_into(Locator::Css(LOGIN_CODE), code, TARGET)
            .await?;
        self.click(Locator::XPath(LOGIN_SUBMIT), TARGET).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        if !self.exists(Locator::Css(LOGIN_BOX), TARGET).await? {
            return Ok(CodeOutcome::LoggedIn);
        }

        if self
            .exists(Locator::XPath(IDENTITY_MAIL_RADIO), TARGET)
            .await?
        {
            return Ok(CodeOutcome::IdentityCheck);
        }

        Ok(CodeOutcome::Rejected)
    }

    async fn confirm_identity(&mut self, mail: &str) -> NavResult<()> {
        const TARGET: &str = "identity confirmation";

        self.click(Locator::XPath(IDENTITY_MAIL_RADIO), TARGET)
            .await?;
        self.type_into(Locator::Css(IDENTITY_ANSWER), mail, TARGET)
            .await?;
        self.click(Locator::XPath(IDENTITY_SUBMIT), TARGET).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        Ok(())
    }

    async fn snapshot(&mut self) -> NavResult<PageSnapshot> {
        const TARGET: &str = "diagnostics";

        let url = self
            .client
            .current_url()
            .await
            .map_err(|e| Self::classify(TARGET, "current_url", e))?
            .to_string();
        let source = self
            .client
            .source()
            .await
            .map_err(|e| Self::classify(TARGET, "source", e))?;

        Ok(PageSnapshot { url, source })
    }
}

/// Extracts the first comma-grouped integer from display text
/// (e.g. "1,234円" -> 1234, "数量：2" -> 2).
fn parse_number(text: &str) -> Option<i64> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();

    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y年%m月%d日").ok()
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), "%Y年%m月%d日 %H:%M").ok()
}

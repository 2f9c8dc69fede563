use chromiumoxide::element::Element;
use chromiumoxide::page::Page;

use super::error::{BrowserError, BrowserResult};

pub async fn find(page: &Page, selector: &str) -> BrowserResult<Element> {
    page.find_element(selector)
        .await
        .map_err(|err| BrowserError::ElementNotFound(format!("{selector}: {err}")))
}

pub async fn click(page: &Page, selector: &str) -> BrowserResult<()> {
    let element = find(page, selector).await?;
    element
        .click()
        .await
        .map_err(|err| BrowserError::NotInteractable(format!("{selector}: {err}")))?;
    Ok(())
}

/// Focuses the element by clicking it, then types `text` key by key.
pub async fn fill(page: &Page, selector: &str, text: &str) -> BrowserResult<()> {
    let element = find(page, selector).await?;
    element
        .click()
        .await
        .map_err(|err| BrowserError::NotInteractable(format!("{selector}: {err}")))?
        .type_str(text)
        .await
        .map_err(|err| BrowserError::NotInteractable(format!("{selector}: {err}")))?;
    Ok(())
}

use crate::browser::{BrowserSession, Locator};
use crate::config::DashboardConfig;
use crate::error::Result;
use crate::probe::types::{Verdict, VerificationDetails};

const DIRECT_CHILDREN: &str = ":scope > *";
const MIN_ITEMS: usize = 2;

/// Raw counts collected from the page. Nested counts stay zero when their
/// container is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardObservation {
    pub primary_count: usize,
    pub secondary_count: usize,
    pub item_count: usize,
    pub action_count: usize,
}

/// Checks that the post-signup page looks like the authenticated dashboard.
pub struct DashboardVerifier {
    contract: DashboardConfig,
}

impl DashboardVerifier {
    pub fn new(contract: &DashboardConfig) -> Self {
        Self {
            contract: contract.clone(),
        }
    }

    pub async fn verify(&self, session: &mut dyn BrowserSession) -> Result<Verdict> {
        let observation = self.observe(session).await?;
        Ok(self.assess(&observation))
    }

    async fn observe(&self, session: &mut dyn BrowserSession) -> Result<DashboardObservation> {
        let primary = Locator::css(&self.contract.primary);
        let mut observation = DashboardObservation {
            primary_count: session.count(&primary).await?,
            action_count: session.count(&Locator::css(&self.contract.action)).await?,
            ..Default::default()
        };

        if observation.primary_count == 0 {
            return Ok(observation);
        }

        let menu = primary.within(&self.contract.secondary);
        observation.secondary_count = session.count(&menu).await?;
        if observation.secondary_count == 0 {
            return Ok(observation);
        }

        observation.item_count = session.count(&menu.within(DIRECT_CHILDREN)).await?;
        if observation.item_count == 0 {
            // Markup variance: some builds wrap the items one level deeper.
            observation.item_count = session
                .count(&menu.within(&self.contract.fallback_items))
                .await?;
        }

        Ok(observation)
    }

    /// Turn counts into a verdict. Checks on nested containers are only
    /// reported when their parent exists.
    pub fn assess(&self, observation: &DashboardObservation) -> Verdict {
        let details = VerificationDetails {
            has_primary_selector: observation.primary_count > 0,
            has_secondary_container: observation.primary_count > 0 && observation.secondary_count > 0,
            item_count_in_secondary_container: observation.item_count,
            has_action_control: observation.action_count > 0,
        };

        let mut problems = Vec::new();
        if !details.has_primary_selector {
            problems.push(format!("Missing `{}`.", self.contract.primary));
        } else if !details.has_secondary_container {
            problems.push(format!(
                "Missing `{}` inside `{}`.",
                self.contract.secondary, self.contract.primary
            ));
        } else if details.item_count_in_secondary_container < MIN_ITEMS {
            problems.push(format!(
                "Expected at least {MIN_ITEMS} elements inside `{}`, found {}.",
                self.contract.secondary, details.item_count_in_secondary_container
            ));
        }
        if !details.has_action_control {
            problems.push(format!("Missing `{}`.", self.contract.action));
        }

        Verdict {
            ok: problems.is_empty(),
            reason_if_failed: (!problems.is_empty()).then(|| problems.join(" ")),
            details,
        }
    }
}

//! Example query patterns ("semantic models") used as retrieval examples.

use fathom_types::PatternPayload;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryPattern {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub sql: &'static str,
    pub tables: &'static [&'static str],
    pub operations: &'static [&'static str],
    /// Text embedded into the `semantic_models` collection.
    pub embedding_text: &'static str,
}

impl QueryPattern {
    pub fn payload(&self) -> PatternPayload {
        PatternPayload {
            pattern_id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            sql: self.sql.to_string(),
            tables: self.tables.iter().map(|t| t.to_string()).collect(),
            operations: self.operations.iter().map(|o| o.to_string()).collect(),
        }
    }
}

const PATTERNS: &[QueryPattern] = &[
    QueryPattern {
        id: "accounts_by_type",
        name: "Account count by type",
        description: "Number of accounts per account type",
        sql: "SELECT account_type, COUNT(*) AS account_count FROM accounts GROUP BY account_type ORDER BY account_count DESC",
        tables: &["accounts"],
        operations: &["COUNT", "GROUP BY"],
        embedding_text: "how many accounts are there of each account type checking savings credit brokerage",
    },
    QueryPattern {
        id: "customers_by_country",
        name: "Customer count by country",
        description: "Number of customers living in each country",
        sql: "SELECT country, COUNT(*) AS customer_count FROM customers GROUP BY country",
        tables: &["customers"],
        operations: &["COUNT", "GROUP BY"],
        embedding_text: "number of customers per country of residence",
    },
    QueryPattern {
        id: "balance_by_customer",
        name: "Total balance per customer",
        description: "Sum of account balances for every customer",
        sql: "SELECT c.full_name, SUM(a.balance) AS total_balance FROM customers c JOIN accounts a ON a.customer_id = c.customer_id GROUP BY c.full_name",
        tables: &["customers", "accounts"],
        operations: &["JOIN", "SUM", "GROUP BY"],
        embedding_text: "total balance held by each customer across all their accounts",
    },
    QueryPattern {
        id: "top_positions",
        name: "Largest positions",
        description: "Positions with the highest market value",
        sql: "SELECT h.account_id, s.ticker, h.market_value FROM holdings h JOIN securities s ON s.security_id = h.security_id ORDER BY h.market_value DESC LIMIT 10",
        tables: &["holdings", "securities"],
        operations: &["JOIN", "ORDER BY", "LIMIT"],
        embedding_text: "top ten largest holdings positions ranked by market value",
    },
    QueryPattern {
        id: "monthly_cash_flow",
        name: "Monthly cash flow",
        description: "Net transaction amount per calendar month",
        sql: "SELECT DATE_TRUNC('month', transaction_date) AS month, SUM(amount) AS net_amount FROM transactions GROUP BY DATE_TRUNC('month', transaction_date) ORDER BY month",
        tables: &["transactions"],
        operations: &["SUM", "GROUP BY", "DATE_TRUNC"],
        embedding_text: "net cash flow per month trend over time from transaction amounts",
    },
    QueryPattern {
        id: "recent_trades",
        name: "Trades in the last 30 days",
        description: "Buy and sell transactions booked during the last thirty days",
        sql: "SELECT transaction_id, account_id, transaction_type, quantity, price FROM transactions WHERE transaction_type IN ('buy', 'sell') AND transaction_date >= CURRENT_DATE - INTERVAL '30 days'",
        tables: &["transactions"],
        operations: &["WHERE", "INTERVAL"],
        embedding_text: "recent buy and sell trades executed in the last 30 days",
    },
    QueryPattern {
        id: "large_withdrawals",
        name: "Large withdrawals",
        description: "Withdrawals above ten thousand dollars",
        sql: "SELECT transaction_id, account_id, amount, transaction_date FROM transactions WHERE transaction_type = 'withdrawal' AND ABS(amount) > 10000",
        tables: &["transactions"],
        operations: &["WHERE"],
        embedding_text: "withdrawals larger than 10000 dollars flagged for review",
    },
    QueryPattern {
        id: "expense_ratio_by_asset_class",
        name: "Average expense ratio by asset class",
        description: "Mean expense ratio of instruments grouped by asset class",
        sql: "SELECT asset_class, AVG(expense_ratio) AS avg_expense_ratio FROM securities GROUP BY asset_class",
        tables: &["securities"],
        operations: &["AVG", "GROUP BY"],
        embedding_text: "average expense ratio for each asset class of securities",
    },
    QueryPattern {
        id: "latest_close",
        name: "Latest closing price",
        description: "Most recent closing price for every ticker",
        sql: "SELECT s.ticker, p.close_price FROM price_history p JOIN securities s ON s.security_id = p.security_id WHERE p.price_date = (SELECT MAX(price_date) FROM price_history)",
        tables: &["price_history", "securities"],
        operations: &["JOIN", "MAX", "WHERE"],
        embedding_text: "latest closing price of each ticker symbol",
    },
    QueryPattern {
        id: "best_funds_ytd",
        name: "Best performing funds year to date",
        description: "Funds with the highest year-to-date return",
        sql: "SELECT s.ticker, f.fund_family, f.ytd_return FROM funds f JOIN securities s ON s.security_id = f.security_id ORDER BY f.ytd_return DESC LIMIT 10",
        tables: &["funds", "securities"],
        operations: &["JOIN", "ORDER BY", "LIMIT"],
        embedding_text: "best performing mutual funds and etfs by ytd return",
    },
    QueryPattern {
        id: "fund_top_constituents",
        name: "Fund top constituents",
        description: "Heaviest weighted constituents reported by a fund",
        sql: "SELECT s.ticker, fh.weight FROM fund_holdings fh JOIN securities s ON s.security_id = fh.security_id WHERE fh.fund_id = :fund_id ORDER BY fh.weight DESC LIMIT 10",
        tables: &["fund_holdings", "securities"],
        operations: &["JOIN", "WHERE", "ORDER BY", "LIMIT"],
        embedding_text: "which stocks does a fund hold with the biggest portfolio weight",
    },
    QueryPattern {
        id: "assets_by_family",
        name: "Assets under management by fund family",
        description: "Total net assets summed per fund family",
        sql: "SELECT fund_family, SUM(total_net_assets) AS aum FROM funds GROUP BY fund_family ORDER BY aum DESC",
        tables: &["funds"],
        operations: &["SUM", "GROUP BY", "ORDER BY"],
        embedding_text: "total assets under management aum for every fund family sponsor",
    },
];

/// Static pattern catalog. Never mutated at runtime.
pub fn patterns() -> &'static [QueryPattern] {
    PATTERNS
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::load;

    #[test]
    fn pattern_ids_and_sources_are_unique() {
        let ids: HashSet<_> = patterns().iter().map(|p| p.id).collect();
        let sources: HashSet<_> = patterns().iter().map(|p| p.embedding_text).collect();
        assert_eq!(ids.len(), patterns().len());
        assert_eq!(sources.len(), patterns().len());
    }

    #[test]
    fn pattern_tables_exist_in_catalog() {
        let schema = load();
        for p in patterns() {
            for t in p.tables {
                assert!(schema.get_table(t).is_some(), "{} references {}", p.id, t);
            }
        }
    }
}

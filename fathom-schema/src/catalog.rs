//! Built-in financial catalog: retail banking plus mutual funds and ETFs.

use crate::define_catalog;

define_catalog! {
    fn financial_tables;

    table customers {
        description: "Bank and brokerage customers",
        columns: {
            customer_id: Uuid, "Unique customer identifier";
            full_name: Text, "Customer legal name";
            email: Text, "Primary contact email";
            date_of_birth: Date, "Customer date of birth";
            country: Text, "Country of residence (ISO 3166 alpha-2)";
            risk_profile: Text, "Investment risk profile: conservative, balanced or aggressive";
            created_at: Timestamp, "When the customer record was created";
        },
        relationships: [],
        sensitive: [email, date_of_birth],
    },

    table accounts {
        description: "Deposit, credit and brokerage accounts owned by customers",
        columns: {
            account_id: Uuid, "Unique account identifier";
            customer_id: Uuid, "Owning customer";
            account_number: Text, "External account number", aggregable: false;
            account_type: Text, "checking, savings, credit or brokerage";
            currency: Text, "Account currency (ISO 4217)";
            balance: Numeric, "Current ledger balance", unit: "USD", aggregable: true;
            credit_limit: Numeric, "Approved credit limit for credit accounts", unit: "USD", aggregable: true;
            opened_on: Date, "Date the account was opened";
            status: Text, "open, frozen or closed";
        },
        relationships: [
            customer_id -> customers.customer_id,
        ],
        sensitive: [account_number],
    },

    table securities {
        description: "Tradable instruments: stocks, bonds, mutual funds and ETFs",
        columns: {
            security_id: Uuid, "Unique security identifier";
            ticker: Text, "Exchange ticker symbol";
            security_name: Text, "Full instrument name";
            asset_class: Text, "equity, fixed_income, mutual_fund or etf";
            sector: Text, "Industry sector";
            exchange: Text, "Primary listing exchange";
            currency: Text, "Quote currency (ISO 4217)";
            expense_ratio: Numeric, "Annual fund expense ratio", unit: "percent", aggregable: true;
            inception_date: Date, "Date the instrument was first listed";
        },
        relationships: [],
        sensitive: [],
    },

    table holdings {
        description: "Positions held in brokerage accounts",
        columns: {
            holding_id: Uuid, "Unique position identifier";
            account_id: Uuid, "Brokerage account holding the position";
            security_id: Uuid, "Security held";
            quantity: Numeric, "Number of shares or units held", unit: "shares", aggregable: true;
            cost_basis: Numeric, "Total purchase cost of the position", unit: "USD", aggregable: true;
            market_value: Numeric, "Current market value of the position", unit: "USD", aggregable: true;
            as_of_date: Date, "Valuation date";
        },
        relationships: [
            account_id -> accounts.account_id,
            security_id -> securities.security_id,
        ],
        sensitive: [],
    },

    table transactions {
        description: "Cash movements and trades posted to accounts",
        columns: {
            transaction_id: Uuid, "Unique transaction identifier";
            account_id: Uuid, "Account the transaction posted to";
            security_id: Uuid, "Traded security, null for cash movements";
            transaction_date: Date, "Trade or value date";
            posted_at: Timestamp, "When the transaction was booked";
            transaction_type: Text, "deposit, withdrawal, transfer, buy, sell, dividend or fee";
            amount: Numeric, "Signed cash amount of the transaction", unit: "USD", aggregable: true;
            quantity: Numeric, "Shares traded for buy and sell transactions", unit: "shares", aggregable: true;
            price: Numeric, "Execution price per share", unit: "USD", aggregable: true;
            fee: Numeric, "Commission or fee charged", unit: "USD", aggregable: true;
            memo: Text, "Free-text transaction memo";
        },
        relationships: [
            account_id -> accounts.account_id,
            security_id -> securities.security_id,
        ],
        sensitive: [],
    },

    table price_history {
        description: "Daily end-of-day prices per security",
        columns: {
            security_id: Uuid, "Priced security";
            price_date: Date, "Trading day";
            open_price: Numeric, "Opening price", unit: "USD", aggregable: true;
            high_price: Numeric, "Intraday high", unit: "USD", aggregable: true;
            low_price: Numeric, "Intraday low", unit: "USD", aggregable: true;
            close_price: Numeric, "Closing price", unit: "USD", aggregable: true;
            adjusted_close: Numeric, "Close adjusted for splits and dividends", unit: "USD", aggregable: true;
            volume: Integer, "Shares traded during the day", unit: "shares", aggregable: true;
        },
        relationships: [
            security_id -> securities.security_id,
        ],
        sensitive: [],
    },

    table funds {
        description: "Mutual fund and ETF profile data",
        columns: {
            fund_id: Uuid, "Unique fund identifier";
            security_id: Uuid, "Listed security for the fund share class";
            fund_family: Text, "Fund sponsor or family";
            fund_category: Text, "Morningstar category";
            total_net_assets: Numeric, "Assets under management", unit: "USD", aggregable: true;
            morningstar_rating: Integer, "Morningstar star rating from 1 to 5", aggregable: false;
            ytd_return: Numeric, "Year-to-date total return", unit: "percent", aggregable: true;
            fund_yield: Numeric, "Trailing twelve month yield", unit: "percent", aggregable: true;
        },
        relationships: [
            security_id -> securities.security_id,
        ],
        sensitive: [],
    },

    table fund_holdings {
        description: "Portfolio constituents reported by each fund",
        columns: {
            fund_id: Uuid, "Reporting fund";
            security_id: Uuid, "Constituent security";
            weight: Numeric, "Share of fund net assets", unit: "percent", aggregable: true;
            shares_held: Numeric, "Shares of the constituent held", unit: "shares", aggregable: true;
            reported_on: Date, "Portfolio report date";
        },
        relationships: [
            fund_id -> funds.fund_id,
            security_id -> securities.security_id,
        ],
        sensitive: [],
    },
}
